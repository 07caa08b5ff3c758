//! Request and response bodies of the App Store Server API, and the decoded
//! payloads of its signed tokens
//!
//! Dates are milliseconds since the Unix epoch, as the API sends them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use storekit_http::Page;

/// Server environment a payload or request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Environment {
    /// Live App Store
    #[default]
    #[serde(alias = "production", alias = "PRODUCTION")]
    Production,
    /// Sandbox testing
    #[serde(alias = "sandbox", alias = "SANDBOX")]
    Sandbox,
}

impl Environment {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Sandbox => "Sandbox",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Answer to an order id lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderLookupResponse {
    /// 0 when the order id is valid, 1 otherwise
    pub status: i32,
    /// Signed transactions of the order
    pub signed_transactions: Vec<String>,
}

/// One page of a customer's transaction history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryResponse {
    /// App identifier in the App Store
    pub app_apple_id: i64,
    /// App bundle id
    pub bundle_id: String,
    /// Environment of the transactions
    pub environment: Environment,
    /// True if more pages follow
    pub has_more: bool,
    /// Cursor for the next page
    pub revision: String,
    /// Signed transactions on this page
    pub signed_transactions: Vec<String>,
}

impl Page for HistoryResponse {
    fn has_more(&self) -> bool {
        self.has_more
    }

    fn cursor(&self) -> Option<&str> {
        Some(&self.revision)
    }
}

/// A single signed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionInfoResponse {
    /// The signed transaction
    pub signed_transaction_info: String,
}

/// One page of refunded transactions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefundLookupResponse {
    /// True if more pages follow
    pub has_more: bool,
    /// Cursor for the next page
    pub revision: String,
    /// Signed refunded transactions on this page
    pub signed_transactions: Vec<String>,
}

impl Page for RefundLookupResponse {
    fn has_more(&self) -> bool {
        self.has_more
    }

    fn cursor(&self) -> Option<&str> {
        Some(&self.revision)
    }
}

/// Statuses of all subscriptions of a customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusResponse {
    /// Environment of the subscriptions
    pub environment: Environment,
    /// App identifier in the App Store
    pub app_apple_id: i64,
    /// App bundle id
    pub bundle_id: String,
    /// One entry per subscription group
    pub data: Vec<SubscriptionGroupIdentifierItem>,
}

/// Subscriptions of one subscription group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionGroupIdentifierItem {
    /// Group identifier
    pub subscription_group_identifier: String,
    /// Latest transaction of each subscription in the group
    pub last_transactions: Vec<LastTransactionsItem>,
}

/// Most recent state of one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LastTransactionsItem {
    /// Original transaction id of the subscription
    pub original_transaction_id: String,
    /// 1 active, 2 expired, 3 billing retry, 4 grace period, 5 revoked
    pub status: i32,
    /// Signed renewal info
    pub signed_renewal_info: String,
    /// Signed transaction
    pub signed_transaction_info: String,
}

/// Progress of a mass renewal-date extension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MassExtendRenewalDateStatusResponse {
    /// Identifier sent with the extension request
    pub request_identifier: String,
    /// True once every eligible subscription was processed
    pub complete: bool,
    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_date: Option<i64>,
    /// Subscriptions that could not be extended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<i64>,
    /// Subscriptions extended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succeeded_count: Option<i64>,
}

/// One page of notification history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationHistoryResponse {
    /// True if more pages follow
    pub has_more: bool,
    /// Cursor for the next page
    pub pagination_token: String,
    /// Notifications on this page
    pub notification_history: Vec<NotificationHistoryResponseItem>,
}

impl Page for NotificationHistoryResponse {
    fn has_more(&self) -> bool {
        self.has_more
    }

    fn cursor(&self) -> Option<&str> {
        Some(&self.pagination_token)
    }
}

/// A notification the server sent, with its delivery attempts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationHistoryResponseItem {
    /// The signed notification
    pub signed_payload: String,
    /// Outcome of the first delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_send_attempt_result: Option<SendAttemptResult>,
    /// All delivery attempts
    pub send_attempts: Vec<SendAttemptItem>,
}

/// A single delivery attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendAttemptItem {
    /// When the attempt was made
    pub attempt_date: i64,
    /// Outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_attempt_result: Option<SendAttemptResult>,
}

/// Outcome of a notification delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendAttemptResult {
    /// Delivered
    Success,
    /// Redirect loop
    CircularRedirect,
    /// Server answered with an invalid response
    InvalidResponse,
    /// No response
    NoResponse,
    /// Other failure
    Other,
    /// Connection closed early
    PrematureClose,
    /// Socket failure
    SocketIssue,
    /// Timed out
    TimedOut,
    /// TLS failure
    TlsIssue,
    /// Unsupported charset
    UnsupportedCharset,
    /// Status other than 200
    UnsuccessfulHttpResponseCode,
    /// Value not known to this crate
    #[serde(other)]
    Unknown,
}

/// Token identifying a requested test notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendTestNotificationResponse {
    /// Pass to [`StoreClient::get_test_notification_status`](crate::StoreClient::get_test_notification_status)
    pub test_notification_token: String,
}

/// Delivery state of a test notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckTestNotificationResponse {
    /// The signed test notification
    pub signed_payload: String,
    /// Delivery attempts so far
    pub send_attempts: Vec<SendAttemptItem>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Consumption data sent in answer to a `CONSUMPTION_REQUEST` notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRequest {
    /// Age of the customer's account
    pub account_tenure: i32,
    /// UUID linking the customer's account
    pub app_account_token: String,
    /// How much of the purchase was consumed
    pub consumption_status: i32,
    /// Customer consented to sharing consumption data
    pub customer_consented: bool,
    /// Whether the purchase was delivered
    pub delivery_status: i32,
    /// Lifetime purchases in USD
    pub lifetime_dollars_purchased: i32,
    /// Lifetime refunds in USD
    pub lifetime_dollars_refunded: i32,
    /// Platform the customer used
    pub platform: i32,
    /// Time spent in the app
    pub play_time: i32,
    /// A free sample or trial was provided
    pub sample_content_provided: bool,
    /// Account status
    pub user_status: i32,
}

/// Reason for extending a renewal date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtendReasonCode {
    /// Undeclared
    #[default]
    Undeclared,
    /// Customer satisfaction
    CustomerSatisfaction,
    /// Other reasons
    Other,
    /// Service issue or outage
    ServiceIssueOrOutage,
}

impl ExtendReasonCode {
    fn code(self) -> i32 {
        match self {
            Self::Undeclared => 0,
            Self::CustomerSatisfaction => 1,
            Self::Other => 2,
            Self::ServiceIssueOrOutage => 3,
        }
    }
}

impl Serialize for ExtendReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ExtendReasonCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i32::deserialize(deserializer)? {
            0 => Ok(Self::Undeclared),
            1 => Ok(Self::CustomerSatisfaction),
            2 => Ok(Self::Other),
            3 => Ok(Self::ServiceIssueOrOutage),
            other => Err(serde::de::Error::custom(format!(
                "unknown extend reason code {other}"
            ))),
        }
    }
}

/// Extend one subscription's renewal date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRenewalDateRequest {
    /// Days to extend by, at most 90
    pub extend_by_days: i32,
    /// Why
    pub extend_reason_code: ExtendReasonCode,
    /// Caller-chosen identifier, at most 128 characters
    pub request_identifier: String,
}

/// Extend the renewal date of every active subscriber of a product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassExtendRenewalDateRequest {
    /// Caller-chosen UUID used to query progress
    pub request_identifier: String,
    /// Days to extend by, at most 90
    pub extend_by_days: i32,
    /// Why
    pub extend_reason_code: ExtendReasonCode,
    /// Product to extend
    pub product_id: String,
    /// Restrict to these storefronts; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storefront_country_codes: Vec<String>,
}

/// Filter for the notification history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHistoryRequest {
    /// Start of the range, inclusive
    pub start_date: i64,
    /// End of the range, exclusive
    pub end_date: i64,
    /// Only notifications about this original transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
    /// Only notifications of this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<NotificationType>,
    /// Only notifications of this subtype
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_subtype: Option<NotificationSubtype>,
    /// Only notifications that failed to reach the server
    #[serde(default)]
    pub only_failures: bool,
    /// Only notifications about this transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Sort order of the transaction history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    Descending,
}

/// Optional filters for the transaction history, sent as query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionHistoryQuery {
    /// Sort order
    pub sort: Option<SortOrder>,
    /// Purchases on or after this date
    pub start_date: Option<i64>,
    /// Purchases before this date
    pub end_date: Option<i64>,
    /// Only these products
    pub product_ids: Vec<String>,
    /// Only these product types
    pub product_types: Vec<ProductType>,
    /// Only these subscription groups
    pub subscription_group_identifiers: Vec<String>,
    /// Only family-shared or only purchased
    pub in_app_ownership_type: Option<String>,
    /// Only revoked, or only not revoked
    pub revoked: Option<bool>,
}

impl TransactionHistoryQuery {
    /// Query parameters, repeated keys for list filters
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(sort) = self.sort {
            let sort = match sort {
                SortOrder::Ascending => "ASCENDING",
                SortOrder::Descending => "DESCENDING",
            };
            pairs.push(("sort", sort.to_string()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.to_string()));
        }
        pairs.extend(self.product_ids.iter().map(|id| ("productId", id.clone())));
        pairs.extend(
            self.product_types
                .iter()
                .map(|kind| ("productType", kind.query_value().to_string())),
        );
        pairs.extend(
            self.subscription_group_identifiers
                .iter()
                .map(|id| ("subscriptionGroupIdentifier", id.clone())),
        );
        if let Some(ownership) = &self.in_app_ownership_type {
            pairs.push(("inAppOwnershipType", ownership.clone()));
        }
        if let Some(revoked) = self.revoked {
            pairs.push(("revoked", revoked.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Signed payloads
// ---------------------------------------------------------------------------

/// Kind of in-app purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    /// Auto-renewable subscription
    #[serde(rename = "Auto-Renewable Subscription")]
    AutoRenewable,
    /// Non-consumable
    #[serde(rename = "Non-Consumable")]
    NonConsumable,
    /// Consumable
    #[serde(rename = "Consumable")]
    Consumable,
    /// Non-renewing subscription
    #[serde(rename = "Non-Renewing Subscription")]
    NonRenewing,
}

impl ProductType {
    fn query_value(self) -> &'static str {
        match self {
            Self::AutoRenewable => "AUTO_RENEWABLE",
            Self::NonConsumable => "NON_CONSUMABLE",
            Self::Consumable => "CONSUMABLE",
            Self::NonRenewing => "NON_RENEWABLE",
        }
    }
}

/// Decoded signed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwsTransaction {
    /// Transaction id
    pub transaction_id: String,
    /// Id of the original purchase
    pub original_transaction_id: String,
    /// Id of subscription purchase events across devices
    pub web_order_line_item_id: Option<String>,
    /// App bundle id
    pub bundle_id: String,
    /// Product id
    pub product_id: String,
    /// Subscription group
    pub subscription_group_identifier: Option<String>,
    /// Purchase time
    pub purchase_date: Option<i64>,
    /// Original purchase time
    pub original_purchase_date: Option<i64>,
    /// Subscription expiry
    pub expires_date: Option<i64>,
    /// Quantity purchased
    pub quantity: Option<i32>,
    /// Product type
    #[serde(rename = "type")]
    pub product_type: Option<ProductType>,
    /// UUID linking the customer's account
    pub app_account_token: Option<String>,
    /// `PURCHASED` or `FAMILY_SHARED`
    pub in_app_ownership_type: Option<String>,
    /// When the token was signed
    pub signed_date: Option<i64>,
    /// Promotional offer type
    pub offer_type: Option<i32>,
    /// Promotional offer id
    pub offer_identifier: Option<String>,
    /// When the purchase was refunded or revoked
    pub revocation_date: Option<i64>,
    /// Why it was revoked
    pub revocation_reason: Option<i32>,
    /// True if the customer upgraded to another subscription
    pub is_upgraded: Option<bool>,
    /// Storefront country code
    pub storefront: Option<String>,
    /// Storefront id
    pub storefront_id: Option<String>,
    /// `PURCHASE` or `RENEWAL`
    pub transaction_reason: Option<String>,
    /// Environment
    pub environment: Option<Environment>,
}

/// Decoded signed renewal info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwsRenewalInfo {
    /// Product the subscription renews to
    pub auto_renew_product_id: String,
    /// 1 if auto-renew is on
    pub auto_renew_status: i32,
    /// Environment
    pub environment: Option<Environment>,
    /// Why the subscription expired
    pub expiration_intent: Option<i32>,
    /// End of the billing grace period
    pub grace_period_expires_date: Option<i64>,
    /// True while billing is retried
    pub is_in_billing_retry_period: Option<bool>,
    /// Offer applied at renewal
    pub offer_identifier: Option<String>,
    /// Offer type applied at renewal
    pub offer_type: Option<i32>,
    /// Id of the original purchase
    pub original_transaction_id: String,
    /// Price increase consent state
    pub price_increase_status: Option<i32>,
    /// Current product
    pub product_id: String,
    /// Start of the current continuous subscription
    pub recent_subscription_start_date: Option<i64>,
    /// Next renewal
    pub renewal_date: Option<i64>,
    /// When the token was signed
    pub signed_date: Option<i64>,
}

/// Notification type of a version 2 server notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// Customer asked for a refund of a consumable
    ConsumptionRequest,
    /// Subscription plan change
    DidChangeRenewalPref,
    /// Auto-renew toggled
    DidChangeRenewalStatus,
    /// Renewal failed on billing
    DidFailToRenew,
    /// Renewed
    DidRenew,
    /// Expired
    Expired,
    /// Billing grace period ended
    GracePeriodExpired,
    /// Offer redeemed
    OfferRedeemed,
    /// Price increase
    PriceIncrease,
    /// Refunded
    Refund,
    /// Refund declined
    RefundDeclined,
    /// Refund reversed
    RefundReversed,
    /// Renewal date extended
    RenewalExtended,
    /// Mass renewal extension progress
    RenewalExtension,
    /// Family sharing revoked
    Revoke,
    /// Subscribed
    Subscribed,
    /// Test notification
    Test,
    /// Value not known to this crate
    #[serde(other)]
    Unknown,
}

/// Notification subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationSubtype {
    /// First purchase
    InitialBuy,
    /// Resubscribed
    Resubscribe,
    /// Downgraded
    Downgrade,
    /// Upgraded
    Upgrade,
    /// Auto-renew enabled
    AutoRenewEnabled,
    /// Auto-renew disabled
    AutoRenewDisabled,
    /// Customer cancelled
    Voluntary,
    /// Billing retry ended
    BillingRetry,
    /// Price increase
    PriceIncrease,
    /// Billing grace period
    GracePeriod,
    /// Billing recovered
    BillingRecovery,
    /// Price increase pending consent
    Pending,
    /// Price increase accepted
    Accepted,
    /// Mass extension summary
    Summary,
    /// Mass extension failure
    Failure,
    /// Value not known to this crate
    #[serde(other)]
    Unknown,
}

/// Decoded version 2 server notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Notification type
    pub notification_type: NotificationType,
    /// Subtype, if any
    #[serde(default)]
    pub subtype: Option<NotificationSubtype>,
    /// Unique id; repeated deliveries share it
    #[serde(rename = "notificationUUID")]
    pub notification_uuid: String,
    /// Payload version, `2.0`
    #[serde(default)]
    pub version: Option<String>,
    /// When the notification was signed
    #[serde(default)]
    pub signed_date: Option<i64>,
    /// App and transaction data
    #[serde(default)]
    pub data: Option<NotificationData>,
}

/// App and transaction data of a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationData {
    /// App identifier in the App Store
    pub app_apple_id: Option<i64>,
    /// App bundle id
    pub bundle_id: String,
    /// App build version
    pub bundle_version: Option<String>,
    /// Environment
    pub environment: Option<Environment>,
    /// Signed renewal info
    pub signed_renewal_info: Option<String>,
    /// Signed transaction
    pub signed_transaction_info: Option<String>,
}

/// A signed payload whose kind was inferred from its claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    /// Payload carries a `transactionId`
    Transaction(Box<JwsTransaction>),
    /// Payload carries a `renewalDate`
    RenewalInfo(Box<JwsRenewalInfo>),
    /// Neither
    Unknown,
}
