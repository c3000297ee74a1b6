//! Request handlers.
//!
//! Thin translation layer: extract the principal, rate-limit mutating
//! calls, delegate to the engine, shape the response. Hidden outcome
//! material (mine placement, server seed plaintext) is only ever included
//! once the round or seed pair is finished.

use super::{
    errors::ApiError,
    middleware::{RateLimiter, RequestId},
};
use crate::{
    engine::{MinesAction, MinesRound, RollDetail, SingleRollSession, WagerEngine},
    feed::BetFeed,
    games::coinflip::CoinChoice,
    games::dice,
    games::mines::{MinesSession, MinesStatus, TOTAL_TILES},
    games::types::BetRecord,
    money::Amount,
    outcome,
    seeds::{RetiredSeedReveal, SeedPairView},
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

pub struct AppState {
    pub engine: Arc<WagerEngine>,
    pub feed: Arc<BetFeed>,
    pub limiter: RateLimiter,
}

/// Authenticated principal, set by the upstream gateway. Auth itself
/// happens there; here a missing or malformed header is a 401.
#[derive(Debug, Clone, Copy)]
pub struct Principal(pub u64);

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|r| r.0.clone())
            .unwrap_or_default();
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .map(Principal)
            .ok_or_else(|| ApiError::unauthorized(request_id))
    }
}

// -- response bodies -------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct BetBody {
    pub seq: u64,
    pub session_id: Uuid,
    pub mode: String,
    pub stake_minor: u64,
    pub payout_minor: u64,
    pub multiplier_bps: u64,
    pub edge_bps: u64,
    pub completed_at: i64,
}

impl From<&BetRecord> for BetBody {
    fn from(r: &BetRecord) -> Self {
        Self {
            seq: r.seq,
            session_id: r.session_id,
            mode: r.mode.to_string(),
            stake_minor: r.stake.minor(),
            payout_minor: r.payout.minor(),
            multiplier_bps: r.multiplier_bps,
            edge_bps: r.edge_bps,
            completed_at: r.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MinesRoundBody {
    pub session_id: Uuid,
    pub status: MinesStatus,
    pub stake_minor: u64,
    pub mines_count: u8,
    pub revealed_tiles: Vec<u8>,
    pub multiplier_bps: u64,
    pub current_payout_minor: u64,
    pub seed_id: Uuid,
    pub nonce: u64,
    pub started_at: i64,
    /// Disclosed only once the round is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine_tiles: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_minor: Option<u64>,
}

impl MinesRoundBody {
    fn open(round: &MinesRound) -> Self {
        Self::from_session(
            &round.session,
            round.multiplier_bps,
            round.current_payout.minor(),
        )
    }

    fn from_session(session: &MinesSession, multiplier_bps: u64, current_payout: u64) -> Self {
        let terminal = session.status.is_terminal();
        Self {
            session_id: session.id,
            status: session.status,
            stake_minor: session.stake.minor(),
            mines_count: session.mines_count,
            revealed_tiles: session.revealed_tiles(),
            multiplier_bps,
            current_payout_minor: current_payout,
            seed_id: session.seed_id,
            nonce: session.nonce,
            started_at: session.started_at,
            mine_tiles: terminal.then(|| session.mine_tiles()),
            payout_minor: terminal.then(|| session.payout.minor()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MinesStateResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<MinesRoundBody>,
}

#[derive(Debug, Serialize)]
pub struct MinesPlayResponse {
    pub active: bool,
    pub round: MinesRoundBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet: Option<BetBody>,
}

#[derive(Debug, Serialize)]
pub struct SingleRollResponse {
    pub session_id: Uuid,
    pub mode: String,
    pub seed_id: Uuid,
    pub nonce: u64,
    pub detail: RollDetail,
    pub bet: BetBody,
}

impl SingleRollResponse {
    fn new(session: SingleRollSession, record: &BetRecord) -> Self {
        Self {
            session_id: session.id,
            mode: session.mode.to_string(),
            seed_id: session.seed_id,
            nonce: session.nonce,
            detail: session.detail,
            bet: record.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RotationResponse {
    pub retired: RetiredSeedReveal,
    pub active: SeedPairView,
}

// -- request bodies --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MinesStartRequest {
    pub stake_minor: u64,
    pub mines: u8,
}

#[derive(Debug, Deserialize)]
pub struct MinesRevealRequest {
    pub tile: u8,
}

#[derive(Debug, Deserialize)]
pub struct DiceRollRequest {
    pub stake_minor: u64,
    pub target: u32,
}

#[derive(Debug, Deserialize)]
pub struct CoinflipRequest {
    pub stake_minor: u64,
    pub choice: CoinChoice,
}

#[derive(Debug, Deserialize)]
pub struct ClientSeedRequest {
    pub client_seed: String,
}

/// Third-party fairness recomputation: given disclosed seed material,
/// reproduce the hidden outcome of any round.
#[derive(Debug, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum VerifyRequest {
    Mines {
        server_seed: String,
        client_seed: String,
        nonce: u64,
        mines: u8,
    },
    Dice {
        server_seed: String,
        client_seed: String,
        nonce: u64,
    },
    Coinflip {
        server_seed: String,
        client_seed: String,
        nonce: u64,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum VerifyResponse {
    Mines { mine_tiles: Vec<u8> },
    Dice { roll: u32 },
    Coinflip { landed: CoinChoice },
}

// -- handlers --------------------------------------------------------------

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /mines
pub async fn mines_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
) -> Result<Json<MinesStateResponse>, ApiError> {
    let round = state
        .engine
        .mines_round(user_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;
    Ok(Json(MinesStateResponse {
        active: round.is_some(),
        round: round.as_ref().map(MinesRoundBody::open),
    }))
}

/// POST /mines/start
pub async fn mines_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
    Json(req): Json<MinesStartRequest>,
) -> Result<Json<MinesPlayResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let round = state
        .engine
        .start_mines(user_id, Amount::from_minor(req.stake_minor), req.mines)
        .await
        .map_err(to_api)?;
    Ok(Json(MinesPlayResponse {
        active: true,
        round: MinesRoundBody::open(&round),
        bet: None,
    }))
}

/// POST /mines/reveal
pub async fn mines_reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
    Json(req): Json<MinesRevealRequest>,
) -> Result<Json<MinesPlayResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let action = state
        .engine
        .reveal_mines_tile(user_id, req.tile)
        .await
        .map_err(to_api)?;
    Ok(Json(play_response(action)))
}

/// POST /mines/cashout
pub async fn mines_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
) -> Result<Json<MinesPlayResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let action = state.engine.cashout_mines(user_id).await.map_err(to_api)?;
    Ok(Json(play_response(action)))
}

fn play_response(action: MinesAction) -> MinesPlayResponse {
    match action {
        MinesAction::Ongoing {
            session,
            multiplier_bps,
            current_payout,
        } => MinesPlayResponse {
            active: true,
            round: MinesRoundBody::from_session(&session, multiplier_bps, current_payout.minor()),
            bet: None,
        },
        MinesAction::Settled { session, record } => MinesPlayResponse {
            active: false,
            round: MinesRoundBody::from_session(
                &session,
                record.multiplier_bps,
                record.payout.minor(),
            ),
            bet: Some((&record).into()),
        },
    }
}

/// POST /dice/roll
pub async fn dice_roll_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
    Json(req): Json<DiceRollRequest>,
) -> Result<Json<SingleRollResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let (session, record) = state
        .engine
        .play_dice(user_id, Amount::from_minor(req.stake_minor), req.target)
        .await
        .map_err(to_api)?;
    Ok(Json(SingleRollResponse::new(session, &record)))
}

/// POST /coinflip/flip
pub async fn coinflip_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
    Json(req): Json<CoinflipRequest>,
) -> Result<Json<SingleRollResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let (session, record) = state
        .engine
        .play_coinflip(user_id, Amount::from_minor(req.stake_minor), req.choice)
        .await
        .map_err(to_api)?;
    Ok(Json(SingleRollResponse::new(session, &record)))
}

/// GET /seeds — active pair, commitment only.
pub async fn seeds_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
) -> Result<Json<SeedPairView>, ApiError> {
    let pair = state
        .engine
        .seeds()
        .active_pair(user_id, crate::games::types::GameMode::Mines)
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;
    Ok(Json(pair.view()))
}

/// POST /seeds/client — set a new client seed (rotates the pair).
pub async fn rotate_client_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
    Json(req): Json<ClientSeedRequest>,
) -> Result<Json<RotationResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let (retired, fresh) = state
        .engine
        .rotate_client_seed(user_id, req.client_seed)
        .await
        .map_err(to_api)?;
    Ok(Json(RotationResponse {
        retired,
        active: fresh.view(),
    }))
}

/// POST /seeds/rotate — rotate the server seed, disclosing the old one.
pub async fn rotate_server_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Principal(user_id): Principal,
) -> Result<Json<RotationResponse>, ApiError> {
    let to_api = |e| ApiError::from_engine(request_id.0.clone(), e);
    state.limiter.check(user_id).map_err(to_api)?;

    let (retired, fresh) = state
        .engine
        .rotate_server_seed(user_id)
        .await
        .map_err(to_api)?;
    Ok(Json(RotationResponse {
        retired,
        active: fresh.view(),
    }))
}

/// GET /seeds/:id — audit disclosure of a retired pair.
pub async fn retired_seed_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(seed_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pair = state
        .engine
        .seeds()
        .retired_pair(seed_id)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("no retired seed {}", seed_id))
        })?;
    Ok(Json(serde_json::json!({
        "seed_id": pair.id,
        "server_seed": hex::encode(pair.server_seed),
        "server_seed_hash": pair.server_seed_hash,
        "client_seed": pair.client_seed,
        "final_nonce": pair.nonce,
        "retired_at": pair.retired_at,
    })))
}

/// POST /verify — recompute an outcome from disclosed material. Pure;
/// no principal required.
pub async fn verify_handler(
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let decode = |hex_seed: &str| -> Result<[u8; 32], ApiError> {
        hex::decode(hex_seed)
            .ok()
            .and_then(|b| <[u8; 32]>::try_from(b).ok())
            .ok_or_else(|| {
                ApiError::bad_request(
                    request_id.0.clone(),
                    "server_seed must be 64 hex characters".to_string(),
                )
            })
    };

    let response = match &req {
        VerifyRequest::Mines {
            server_seed,
            client_seed,
            nonce,
            mines,
        } => {
            if !(crate::games::mines::MIN_MINES..=crate::games::mines::MAX_MINES).contains(mines) {
                return Err(ApiError::bad_request(
                    request_id.0.clone(),
                    format!("mines count {} out of range", mines),
                ));
            }
            VerifyResponse::Mines {
                mine_tiles: outcome::mine_positions(
                    &decode(server_seed)?,
                    client_seed,
                    *nonce,
                    TOTAL_TILES,
                    *mines,
                ),
            }
        }
        VerifyRequest::Dice {
            server_seed,
            client_seed,
            nonce,
        } => VerifyResponse::Dice {
            roll: outcome::roll(&decode(server_seed)?, client_seed, *nonce, dice::SIDES),
        },
        VerifyRequest::Coinflip {
            server_seed,
            client_seed,
            nonce,
        } => VerifyResponse::Coinflip {
            landed: CoinChoice::from_bit(outcome::roll(
                &decode(server_seed)?,
                client_seed,
                *nonce,
                2,
            )),
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedConfig, WagerConfig};
    use crate::games::mines::MinesSession;
    use crate::seeds::SeedRegistry;
    use crate::storage::Store;
    use tempfile::TempDir;

    fn app_state(window_ms: u64) -> (TempDir, Arc<AppState>) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.create_account(1, Amount::from_minor(10_000)).unwrap();
        let seeds = SeedRegistry::new(store.clone());
        seeds.provision(1, None).unwrap();
        let feed = Arc::new(BetFeed::new(FeedConfig::default()));
        let engine = Arc::new(WagerEngine::new(
            store,
            seeds,
            feed.clone(),
            WagerConfig::default(),
        ));
        let state = Arc::new(AppState {
            engine,
            feed,
            limiter: RateLimiter::new(window_ms),
        });
        (dir, state)
    }

    #[tokio::test]
    async fn seed_rotation_is_rate_limited() {
        let (_dir, state) = app_state(60_000);

        rotate_server_seed_handler(
            Extension(RequestId("r1".into())),
            State(state.clone()),
            Principal(1),
        )
        .await
        .unwrap();

        let err = rotate_server_seed_handler(
            Extension(RequestId("r2".into())),
            State(state.clone()),
            Principal(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "RATE_LIMITED");

        // The client-seed route shares the same per-user window.
        let err = rotate_client_seed_handler(
            Extension(RequestId("r3".into())),
            State(state),
            Principal(1),
            Json(ClientSeedRequest {
                client_seed: "fresh".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "RATE_LIMITED");
    }

    #[test]
    fn open_round_body_hides_mine_placement() {
        let session = MinesSession::sample_open(1, Amount::from_minor(1_000));
        let body = MinesRoundBody::from_session(&session, 10_000, 1_000);
        assert!(body.mine_tiles.is_none());
        assert!(body.payout_minor.is_none());
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("mine_tiles"));
    }

    #[test]
    fn terminal_round_body_discloses_mines() {
        let mut session = MinesSession::sample_open(1, Amount::from_minor(1_000));
        session.reveal(0, 100, 0).unwrap(); // tile 0 is a mine in the sample
        let body = MinesRoundBody::from_session(&session, 0, 0);
        assert_eq!(body.status, MinesStatus::Busted);
        assert_eq!(body.mine_tiles, Some(vec![0, 1, 2]));
        assert_eq!(body.payout_minor, Some(0));
    }

    #[test]
    fn verify_request_parses_tagged_games() {
        let req: VerifyRequest = serde_json::from_str(
            r#"{"game":"mines","server_seed":"ab","client_seed":"c","nonce":0,"mines":3}"#,
        )
        .unwrap();
        assert!(matches!(req, VerifyRequest::Mines { mines: 3, .. }));

        let req: VerifyRequest = serde_json::from_str(
            r#"{"game":"dice","server_seed":"ab","client_seed":"c","nonce":9}"#,
        )
        .unwrap();
        assert!(matches!(req, VerifyRequest::Dice { nonce: 9, .. }));
    }
}
