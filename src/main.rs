//! Duel Arbiter
//!
//! Runs a demo duel through the service layer against an in-memory store.

use std::sync::Arc;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duel_arbiter::{
    VERSION, DirectionVector, MatchConfig, MatchId, MatchService, Position, Seat,
    core::hash::short_hex,
    game::events::ArbiterEventData,
    service::{AuthConfig, InMemoryStore, PlayerClient, Role, RoleTable, TokenClaims},
};

/// Rounds to play before giving up on a winner.
const DEMO_ROUND_LIMIT: u64 = 20;

/// Lifetime of the tokens the demo issues.
const DEMO_TOKEN_TTL_SECS: u64 = 600;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Duel Arbiter v{}", VERSION);

    let config = MatchConfig::from_env().context("loading match config")?;
    info!(
        health = config.starting_health,
        damage = config.attack_damage,
        range = config.attack_range,
        shape = ?config.attack_shape,
        "match config"
    );

    demo_match(config)
}

/// Two scripted players close in on each other and trade line attacks.
fn demo_match(config: MatchConfig) -> Result<()> {
    info!("=== Starting Demo Match ===");

    // The demo stands in for the auth provider, so it signs with a fresh
    // HS256 secret. Issuer and audience still come from the environment.
    let secret = hex::encode(rand::thread_rng().gen::<[u8; 32]>());
    let auth = AuthConfig {
        secret: Some(secret.clone()),
        public_key_pem: None,
        ..AuthConfig::from_env()
    };

    let roles = Arc::new(RoleTable::new());
    let match_id = MatchId::random();
    let service = MatchService::new(match_id, config.clone(), Arc::new(InMemoryStore::new()), Arc::clone(&roles))
        .with_auth(auth.clone());
    let mut events = service.subscribe();

    info!("Match ID: {}", match_id);

    let operator = service.authenticate_caller(&issue_token("operator", &auth, &secret)?)?;
    let mut p1 = PlayerClient::new(
        service.authenticate_caller(&issue_token("player-one", &auth, &secret)?)?,
        Seat::P1,
        Position::new(1, 4),
    );
    let mut p2 = PlayerClient::new(
        service.authenticate_caller(&issue_token("player-two", &auth, &secret)?)?,
        Seat::P2,
        Position::new(7, 5),
    );

    roles.grant(operator, Role::Operator);
    roles.grant(p1.player(), Role::Player1);
    roles.grant(p2.player(), Role::Player2);

    service.create_match(&operator)?;
    for client in [&p1, &p2] {
        service.register_agent(&client.player())?;
        service.join_match(&client.player())?;
    }
    service.instantiate_identities(&operator, p1.player(), p2.player())?;
    service.instantiate_positions(&operator, p1.position(), p2.position())?;
    service.instantiate_health(&operator, config.starting_health)?;

    for round in 0..DEMO_ROUND_LIMIT {
        if round > 0 {
            p1.sync(&service)?;
            p2.sync(&service)?;
        }

        let (m1, a1) = approach(p1.position(), p2.position())?;
        let (m2, a2) = approach(p2.position(), p1.position())?;
        p1.commit(&service, m1, a1)?;
        p2.commit(&service, m2, a2)?;

        p1.reveal_move(&service)?;
        p2.reveal_move(&service)?;
        p1.reveal_attack(&service, p2.position())?;
        if service.arbiter()?.is_over() {
            break;
        }
        p2.reveal_attack(&service, p1.position())?;
        if service.arbiter()?.is_over() {
            break;
        }
        service.complete_round(&operator)?;

        let arbiter = service.arbiter()?;
        info!(
            "Round {}: P1 {} hp at {}, P2 {} hp at {}",
            round,
            arbiter.health(Seat::P1),
            p1.position(),
            arbiter.health(Seat::P2),
            p2.position()
        );
    }

    while let Ok(event) = events.try_recv() {
        if let ArbiterEventData::AttackResolved { attacker, hit: true, damage, target_health } = event.data {
            info!("Tick {}: {} hit for {} ({} left)", event.game_tick, attacker, damage, target_health);
        }
    }

    info!("=== Match Results ===");
    let arbiter = service.arbiter()?;
    match arbiter.outcome() {
        Some(outcome) => info!("Winner: {} in round {}", outcome.winner, outcome.game_tick),
        None => info!("No winner after {} rounds", arbiter.game_tick()),
    }
    info!("Final State Hash: {}", short_hex(&arbiter.state_hash()));

    Ok(())
}

/// Sign a short-lived token for `sub` the way the auth provider would.
fn issue_token(sub: &str, auth: &AuthConfig, secret: &str) -> Result<String> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = TokenClaims {
        sub: sub.into(),
        exp: now + DEMO_TOKEN_TTL_SECS,
        iat: now,
        iss: auth.issuer.clone(),
        aud: auth.audience.clone().map(serde_json::Value::String),
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key).context("signing demo token")
}

/// Step toward the target and attack along the axis it is farthest on.
fn approach(from: Position, to: Position) -> Result<(u8, u8)> {
    let dx = to.x.cmp(&from.x) as i64;
    let dy = to.y.cmp(&from.y) as i64;
    // Numpad layout: row by dy, column by dx.
    let move_code = (5 + dx + 3 * dy) as u8;

    let after = from.step(DirectionVector::from_code(move_code)?)?;
    let attack_code = if to.x.abs_diff(after.x) >= to.y.abs_diff(after.y) {
        if to.x >= after.x { 6 } else { 4 }
    } else if to.y >= after.y {
        8
    } else {
        2
    };
    Ok((move_code, attack_code))
}
