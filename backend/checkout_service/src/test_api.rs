use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use checkout_engine::{
    CheckoutApi, CheckoutConfig, CheckoutError, CheckoutStatus, CheckoutValidation,
    CompletedCheckout, Currency, PaymentIntentInput, Project, Reward, SelectionOutcome,
    ShippingRule, ShippingRulesSource, ShippingType, StoredCard, SubmissionState, User,
};
use rust_decimal::Decimal;

use crate::api::{self, ApiState, CheckoutRequest, CheckoutsQuery};
use crate::db;
use crate::errors::ServiceError;
use crate::sessions::{OpenSessionRequest, SessionRegistry};

#[derive(Default)]
struct FakeBackend {
    shipping_down: bool,
    shipping_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

#[async_trait]
impl CheckoutApi for FakeBackend {
    async fn create_payment_intent(
        &self,
        input: &PaymentIntentInput,
    ) -> checkout_engine::Result<String> {
        Ok(format!("pi_{}", input.checkout_id))
    }

    async fn validate_checkout(
        &self,
        _checkout_id: &str,
        _client_secret: &str,
        _payment_source_id: &str,
    ) -> checkout_engine::Result<CheckoutValidation> {
        Ok(CheckoutValidation {
            is_valid: true,
            messages: Vec::new(),
        })
    }

    async fn complete_on_session_checkout(
        &self,
        _checkout_id: &str,
        _client_secret: &str,
        _payment_source_id: Option<&str>,
        _reusable: bool,
    ) -> checkout_engine::Result<CompletedCheckout> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletedCheckout {
            status: CheckoutStatus::Successful,
            requires_action: false,
        })
    }

    async fn create_setup_intent(
        &self,
        project_id: Option<&str>,
    ) -> checkout_engine::Result<String> {
        Ok(format!("seti_{}", project_id.unwrap_or("account")))
    }

    async fn stored_cards(&self) -> checkout_engine::Result<Vec<StoredCard>> {
        Ok(vec![StoredCard {
            id: "card-1".into(),
            last_four: "4242".into(),
            card_type: "VISA".into(),
            expiration_date: Some("2030-01-01".into()),
        }])
    }
}

#[async_trait]
impl ShippingRulesSource for FakeBackend {
    async fn fetch_shipping_rules(
        &self,
        _project_id: &str,
        _reward_id: u64,
    ) -> checkout_engine::Result<Vec<ShippingRule>> {
        self.shipping_calls.fetch_add(1, Ordering::SeqCst);
        if self.shipping_down {
            return Err(CheckoutError::Api("shipping lookup failed".into()));
        }
        Ok(vec![
            ShippingRule::new(23, "Brooklyn, NY", Decimal::from(30)),
            ShippingRule::new(44, "Berlin, DE", Decimal::from(45)),
        ])
    }
}

async fn state_with(backend: Arc<FakeBackend>) -> Arc<ApiState> {
    let pool = db::init_pool("sqlite::memory:", 1).await.unwrap();
    Arc::new(ApiState {
        pool,
        registry: SessionRegistry::new(),
        checkout_api: backend.clone(),
        shipping: backend,
        config: CheckoutConfig::default(),
    })
}

fn open_request(user: Option<User>) -> OpenSessionRequest {
    OpenSessionRequest {
        project: Project::new("p1", "Tabletop game", Currency::usd()),
        rewards: vec![
            Reward::new(1, "Digital copy", Decimal::from(10)),
            Reward::new(2, "Deluxe box", Decimal::from(20))
                .with_shipping_type(ShippingType::Anywhere),
        ],
        add_ons: Vec::new(),
        backing: None,
        user,
    }
}

async fn open(state: &Arc<ApiState>, user: Option<User>) -> u64 {
    let response = api::open_session(State(state.clone()), Json(open_request(user)))
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    view["session_id"].as_u64().unwrap()
}

fn checkout_body() -> CheckoutRequest {
    CheckoutRequest {
        checkout_id: Some("chk-1".into()),
        backing_id: Some("b-1".into()),
        payment_source_id: Some("card-1".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_shipped_reward_loads_rules_and_preselects_user_location() {
    let backend = Arc::new(FakeBackend::default());
    let state = state_with(backend.clone()).await;
    let user = User {
        id: 7,
        location_id: Some(44),
        chosen_currency: None,
    };
    let id = open(&state, Some(user)).await;

    let Json(response) = api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 2 }),
    )
    .await
    .unwrap();

    assert!(matches!(
        response.outcome,
        SelectionOutcome::Advanced { reward_id: 2, .. }
    ));
    assert_eq!(backend.shipping_calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.session.shipping_rules.len(), 2);
    assert_eq!(response.session.shipping_location_id, Some(44));
    assert!(!response.session.needs_shipping_rule);
    assert_eq!(
        response.session.snapshot.unwrap().total_amount,
        Decimal::from(65)
    );
}

#[tokio::test]
async fn test_shipping_outage_leaves_session_waiting_for_a_rule() {
    let backend = Arc::new(FakeBackend {
        shipping_down: true,
        ..Default::default()
    });
    let state = state_with(backend).await;
    let id = open(&state, None).await;

    let Json(response) = api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 2 }),
    )
    .await
    .unwrap();

    assert!(response.session.needs_shipping_rule);
    assert!(response.session.snapshot.is_none());

    let err = api::submit_checkout(State(state.clone()), Path(id), Json(checkout_body()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pledge_actions_update_the_view() {
    let state = state_with(Arc::new(FakeBackend::default())).await;
    let id = open(&state, None).await;
    api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 1 }),
    )
    .await
    .unwrap();

    api::increase_pledge(State(state.clone()), Path(id)).await.unwrap();
    api::increase_bonus(State(state.clone()), Path(id)).await.unwrap();
    let Json(view) = api::get_session(State(state.clone()), Path(id)).await.unwrap();
    let snapshot = view.snapshot.unwrap();
    assert_eq!(snapshot.pledge_amount, Decimal::from(11));
    assert_eq!(snapshot.total_amount, Decimal::from(12));

    let err = api::set_pledge_amount(
        State(state.clone()),
        Path(id),
        Json(api::PledgeAmountRequest {
            amount: Decimal::from(-3),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_checkout_id_is_recorded_on_the_session() {
    let backend = Arc::new(FakeBackend::default());
    let state = state_with(backend.clone()).await;
    let id = open(&state, None).await;
    api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 1 }),
    )
    .await
    .unwrap();

    let body = CheckoutRequest {
        checkout_id: None,
        backing_id: None,
        ..checkout_body()
    };
    let err = api::submit_checkout(State(state.clone()), Path(id), Json(body))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Checkout(CheckoutError::MissingCheckoutId)
    ));
    assert_eq!(backend.complete_calls.load(Ordering::SeqCst), 0);
    let Json(view) = api::get_session(State(state.clone()), Path(id)).await.unwrap();
    assert!(view.last_error.is_some());
    assert!(!view.is_loading);
    assert_eq!(view.submission, SubmissionState::Idle);
    assert_eq!(view.failed_attempts, 1);
}

#[tokio::test]
async fn test_missing_backing_reaches_the_error_callback_once() {
    let backend = Arc::new(FakeBackend::default());
    let state = state_with(backend.clone()).await;
    let id = open(&state, None).await;
    api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 1 }),
    )
    .await
    .unwrap();

    let body = CheckoutRequest {
        backing_id: None,
        ..checkout_body()
    };
    let err = api::submit_checkout(State(state.clone()), Path(id), Json(body))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Checkout(CheckoutError::MissingBacking)
    ));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.complete_calls.load(Ordering::SeqCst), 0);
    let Json(view) = api::get_session(State(state.clone()), Path(id)).await.unwrap();
    assert_eq!(view.failed_attempts, 1);
    assert!(!view.is_loading);
}

#[tokio::test]
async fn test_incomplete_pledge_reaches_the_error_callback() {
    let state = state_with(Arc::new(FakeBackend::default())).await;
    let id = open(&state, None).await;

    let err = api::submit_checkout(State(state.clone()), Path(id), Json(checkout_body()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Checkout(CheckoutError::NoRewardSelected)
    ));
    let Json(view) = api::get_session(State(state.clone()), Path(id)).await.unwrap();
    assert_eq!(view.failed_attempts, 1);
    assert_eq!(view.submission, SubmissionState::Idle);
}

#[tokio::test]
async fn test_successful_checkout_is_recorded_once() {
    let backend = Arc::new(FakeBackend::default());
    let state = state_with(backend.clone()).await;
    let id = open(&state, None).await;
    api::select_reward(
        State(state.clone()),
        Path(id),
        Json(api::SelectRewardRequest { reward_id: 1 }),
    )
    .await
    .unwrap();

    let Json(response) =
        api::submit_checkout(State(state.clone()), Path(id), Json(checkout_body()))
            .await
            .unwrap();
    assert_eq!(response.result.checkout_id, "chk-1");
    assert!(response.result.should_show_success);
    assert!(matches!(
        response.session.submission,
        SubmissionState::Success(_)
    ));

    let again = api::submit_checkout(State(state.clone()), Path(id), Json(checkout_body()))
        .await
        .unwrap_err();
    assert_eq!(again.status_code(), StatusCode::CONFLICT);
    assert_eq!(backend.complete_calls.load(Ordering::SeqCst), 1);

    let rows = db::get_checkouts_for_project(&state.pool, "p1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, "10");
    assert_eq!(rows[0].reward_id, 1);

    let response = api::get_checkouts(
        State(state.clone()),
        Query(CheckoutsQuery { project_id: None }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let state = state_with(Arc::new(FakeBackend::default())).await;

    let err = api::get_session(State(state.clone()), Path(42)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let id = open(&state, None).await;
    assert_eq!(
        api::close_session(State(state.clone()), Path(id)).await.unwrap(),
        StatusCode::NO_CONTENT
    );
    assert!(api::close_session(State(state.clone()), Path(id)).await.is_err());
}

#[tokio::test]
async fn test_cards_and_setup_intents() {
    let state = state_with(Arc::new(FakeBackend::default())).await;

    let Json(cards) = api::get_stored_cards(State(state.clone())).await.unwrap();
    assert_eq!(cards.count, 1);
    assert_eq!(cards.cards[0].last_four, "4242");

    let response = api::create_setup_intent(
        State(state.clone()),
        Json(api::SetupIntentRequest {
            project_id: Some("p1".into()),
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
}
