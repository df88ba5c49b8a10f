//! GraphQL client for the marketplace backend.
//!
//! Implements the engine's [`CheckoutApi`] and [`ShippingRulesSource`] seams on
//! top of a single `execute` call. Objects are addressed by relay-style node
//! ids (`base64("Reward-12")`), encoded and decoded here.
//!
//! ## Resilience
//!
//! * Rate-limit responses are retried with exponential back-off, up to
//!   [`MAX_ATTEMPTS`] attempts.
//! * Transport errors are NOT retried: checkout mutations are not idempotent.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use checkout_engine::{
    CheckoutApi, CheckoutStatus, CheckoutValidation, CompletedCheckout,
    PaymentIntentInput, ShippingRule, ShippingRulesSource, StoredCard,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{Result, ServiceError};

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MILLIS: u64 = 500;

// ─────────────────────────────────────────────────────────
// Response envelope
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    /// Errors win over partial data.
    pub fn into_result(self) -> Result<T> {
        if !self.errors.is_empty() {
            let joined = self
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ServiceError::GraphQl(joined));
        }
        self.data
            .ok_or_else(|| ServiceError::GraphQl("Empty data in response".to_string()))
    }
}

// ─────────────────────────────────────────────────────────
// Node ids
// ─────────────────────────────────────────────────────────

pub fn encode_node_id(type_name: &str, id: u64) -> String {
    ENGINE.encode(format!("{type_name}-{id}"))
}

/// Decode `base64("Type-123")` into its numeric id. Plain numeric strings are
/// accepted as-is.
pub fn decode_node_id(node_id: &str) -> Option<u64> {
    if let Ok(n) = node_id.parse() {
        return Some(n);
    }
    let bytes = ENGINE.decode(node_id).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (_, id) = text.rsplit_once('-')?;
    id.parse().ok()
}

// ─────────────────────────────────────────────────────────
// Payload shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientSecretPayload {
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentIntentData {
    #[serde(rename = "createPaymentIntent")]
    payload: ClientSecretPayload,
}

#[derive(Debug, Deserialize)]
struct CreateSetupIntentData {
    #[serde(rename = "createSetupIntent")]
    payload: ClientSecretPayload,
}

#[derive(Debug, Deserialize)]
struct ValidateCheckoutData {
    #[serde(rename = "validateCheckout")]
    payload: ValidateCheckoutPayload,
}

#[derive(Debug, Deserialize)]
struct ValidateCheckoutPayload {
    valid: bool,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteCheckoutData {
    #[serde(rename = "completeOnSessionCheckout")]
    payload: CompleteCheckoutPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteCheckoutPayload {
    checkout: CheckoutNode,
    #[serde(default)]
    requires_action: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CheckoutNode {
    state: String,
}

#[derive(Debug, Deserialize)]
struct StoredCardsData {
    me: Option<MeNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeNode {
    stored_cards: Connection<CardNode>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardNode {
    id: String,
    last_four: String,
    #[serde(rename = "type")]
    card_type: String,
    expiration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShippingRulesData {
    node: Option<RewardNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewardNode {
    shipping_rules_expanded: Connection<ShippingRuleNode>,
}

#[derive(Debug, Deserialize)]
struct ShippingRuleNode {
    cost: MoneyNode,
    location: LocationNode,
}

#[derive(Debug, Deserialize)]
struct MoneyNode {
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationNode {
    id: String,
    display_name: String,
}

// ─────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────

const CREATE_PAYMENT_INTENT: &str = r#"
mutation CreatePaymentIntent($input: CreatePaymentIntentInput!) {
  createPaymentIntent(input: $input) { clientSecret }
}"#;

const VALIDATE_CHECKOUT: &str = r#"
mutation ValidateCheckout($checkoutId: ID!, $paymentSourceId: String!, $paymentIntentClientSecret: String!) {
  validateCheckout(checkoutId: $checkoutId, paymentSourceId: $paymentSourceId, paymentIntentClientSecret: $paymentIntentClientSecret) {
    valid
    messages
  }
}"#;

const COMPLETE_ON_SESSION_CHECKOUT: &str = r#"
mutation CompleteOnSessionCheckout($input: CompleteOnSessionCheckoutInput!) {
  completeOnSessionCheckout(input: $input) {
    checkout { id state }
    requiresAction
  }
}"#;

const CREATE_SETUP_INTENT: &str = r#"
mutation CreateSetupIntent($input: CreateSetupIntentInput!) {
  createSetupIntent(input: $input) { clientSecret }
}"#;

const STORED_CARDS: &str = r#"
query StoredCards {
  me { storedCards { nodes { id lastFour type expirationDate } } }
}"#;

const SHIPPING_RULES: &str = r#"
query ShippingRules($rewardId: ID!) {
  node(id: $rewardId) {
    ... on Reward {
      shippingRulesExpanded { nodes { cost { amount } location { id displayName } } }
    }
  }
}"#;

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GraphQlClient {
    client: Client,
    url: String,
    token: String,
}

impl GraphQlClient {
    pub fn new(client: Client, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token: token.into(),
        }
    }

    /// POST one operation and decode its `data`.
    pub async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let mut backoff = INITIAL_BACKOFF_MILLIS;
        let mut attempt = 1;

        loop {
            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&self.token)
                .json(&json!({ "query": query, "variables": variables }))
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                warn!("Rate-limited by backend (attempt {attempt}, retry in {backoff}ms)");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                backoff *= 2;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                return Err(ServiceError::GraphQl(format!("HTTP status {status}")));
            }

            let body: GraphQlResponse<T> = resp.json().await?;
            debug!("GraphQL call completed ({} errors)", body.errors.len());
            return body.into_result();
        }
    }

    async fn fetch_rules(&self, reward_id: u64) -> Result<Vec<ShippingRule>> {
        let data: ShippingRulesData = self
            .execute(
                SHIPPING_RULES,
                json!({ "rewardId": encode_node_id("Reward", reward_id) }),
            )
            .await?;
        let nodes = data
            .node
            .map(|n| n.shipping_rules_expanded.nodes)
            .unwrap_or_default();
        nodes.into_iter().map(shipping_rule_from_node).collect()
    }
}

fn shipping_rule_from_node(node: ShippingRuleNode) -> Result<ShippingRule> {
    let location_id = decode_node_id(&node.location.id).ok_or_else(|| {
        ServiceError::GraphQl(format!("Unreadable location id: {}", node.location.id))
    })?;
    let cost: Decimal = node
        .cost
        .amount
        .parse()
        .map_err(|_| ServiceError::GraphQl(format!("Unreadable amount: {}", node.cost.amount)))?;
    Ok(ShippingRule::new(location_id, node.location.display_name, cost))
}

fn completed_from_payload(payload: CompleteCheckoutPayload) -> CompletedCheckout {
    let status = CheckoutStatus::from_api(&payload.checkout.state);
    CompletedCheckout {
        status,
        requires_action: payload
            .requires_action
            .unwrap_or(status == CheckoutStatus::RequiresAction),
    }
}

// ─────────────────────────────────────────────────────────
// Engine seams
// ─────────────────────────────────────────────────────────

#[async_trait]
impl CheckoutApi for GraphQlClient {
    async fn create_payment_intent(
        &self,
        input: &PaymentIntentInput,
    ) -> checkout_engine::Result<String> {
        let data: CreatePaymentIntentData = self
            .execute(
                CREATE_PAYMENT_INTENT,
                json!({
                    "input": {
                        "projectId": input.project_id,
                        "checkoutId": input.checkout_id,
                        "amount": input.amount.to_string(),
                        "currency": input.currency,
                        "paymentIntentContext": "CROWDFUNDING_CHECKOUT",
                    }
                }),
            )
            .await?;
        Ok(data.payload.client_secret)
    }

    async fn validate_checkout(
        &self,
        checkout_id: &str,
        client_secret: &str,
        payment_source_id: &str,
    ) -> checkout_engine::Result<CheckoutValidation> {
        let data: ValidateCheckoutData = self
            .execute(
                VALIDATE_CHECKOUT,
                json!({
                    "checkoutId": checkout_id,
                    "paymentSourceId": payment_source_id,
                    "paymentIntentClientSecret": client_secret,
                }),
            )
            .await?;
        Ok(CheckoutValidation {
            is_valid: data.payload.valid,
            messages: data.payload.messages,
        })
    }

    async fn complete_on_session_checkout(
        &self,
        checkout_id: &str,
        client_secret: &str,
        payment_source_id: Option<&str>,
        reusable: bool,
    ) -> checkout_engine::Result<CompletedCheckout> {
        let data: CompleteCheckoutData = self
            .execute(
                COMPLETE_ON_SESSION_CHECKOUT,
                json!({
                    "input": {
                        "checkoutId": checkout_id,
                        "paymentIntentClientSecret": client_secret,
                        "paymentSourceId": payment_source_id,
                        "paymentSourceReusable": reusable,
                    }
                }),
            )
            .await?;
        Ok(completed_from_payload(data.payload))
    }

    async fn create_setup_intent(&self, project_id: Option<&str>) -> checkout_engine::Result<String> {
        let data: CreateSetupIntentData = self
            .execute(
                CREATE_SETUP_INTENT,
                json!({ "input": { "projectId": project_id } }),
            )
            .await?;
        Ok(data.payload.client_secret)
    }

    async fn stored_cards(&self) -> checkout_engine::Result<Vec<StoredCard>> {
        let data: StoredCardsData = self.execute(STORED_CARDS, json!({})).await?;
        let cards = data
            .me
            .map(|me| me.stored_cards.nodes)
            .unwrap_or_default()
            .into_iter()
            .map(|c| StoredCard {
                id: c.id,
                last_four: c.last_four,
                card_type: c.card_type,
                expiration_date: c.expiration_date,
            })
            .collect();
        Ok(cards)
    }
}

#[async_trait]
impl ShippingRulesSource for GraphQlClient {
    async fn fetch_shipping_rules(
        &self,
        project_id: &str,
        reward_id: u64,
    ) -> checkout_engine::Result<Vec<ShippingRule>> {
        debug!("Fetching shipping rules for project {project_id}, reward {reward_id}");
        Ok(self.fetch_rules(reward_id).await?)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
