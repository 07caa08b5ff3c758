//! App Store Server API client

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::header::{ACCEPT, USER_AGENT};
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use storekit_auth::{SigningIdentity, TokenIssuer};
use storekit_http::{
    Authenticate, Body, DecodeBody, Decoded, EncodeBody, Execute, HttpError, JitterBackoff, Next,
    Page, PaginationError, Paginator, Pipeline, PipelineBuilder, RateLimit, RateLimiter, Request,
    RequireBody, RequireStatus, ReqwestTransport, Retry, SetHeader,
};
use storekit_trust::{SignedPayloadVerifier, TrustStore, TrustStoreConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::{ConfigError, StoreConfig};
use crate::endpoint::Route;
use crate::error::Error;
use crate::models::{
    CheckTestNotificationResponse, ConsumptionRequest, Environment, ExtendRenewalDateRequest,
    HistoryResponse, MassExtendRenewalDateRequest, MassExtendRenewalDateStatusResponse,
    NotificationHistoryRequest, NotificationHistoryResponse, NotificationHistoryResponseItem,
    OrderLookupResponse, RefundLookupResponse, SendTestNotificationResponse, StatusResponse,
    TransactionHistoryQuery, TransactionInfoResponse,
};

type Query = Vec<(&'static str, String)>;

/// Statuses accepted from operations that only report success
const ACCEPTED_WRITE: &[StatusCode] = &[StatusCode::OK, StatusCode::ACCEPTED];

/// Whether a request body may be sent more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Allowed,
    Never,
}

/// Client for the App Store Server API
///
/// Cheap to clone; clones share the token cache, the rate limiter, the trust store
/// and the shutdown signal. Every call assembles a fresh pipeline from these shared
/// parts, outermost first: encode, decode, retry, rate limit, required body,
/// required status, authenticate, default headers, transport. The status check sits
/// inside the body check so an empty 5xx or 429 still reaches retry with its status.
#[derive(Clone)]
pub struct StoreClient {
    issuer: Arc<TokenIssuer>,
    verifier: Arc<SignedPayloadVerifier>,
    transport: Next,
    limiter: Option<Arc<RateLimiter>>,
    backoff: Option<JitterBackoff>,
    base_url: Url,
    user_agent: HeaderValue,
    paginator: Paginator,
    shutdown: CancellationToken,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.base_url.as_str())
            .field("issuer", &self.issuer)
            .field("rate_limit", &self.limiter.as_ref().map(|l| l.limit()))
            .field("retry", &self.backoff)
            .field("paginator", &self.paginator)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Client with default settings for `environment`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(identity: SigningIdentity, environment: Environment) -> crate::Result<Self> {
        Self::builder(identity).environment(environment).build()
    }

    /// Start building a client
    pub fn builder(identity: SigningIdentity) -> StoreClientBuilder {
        StoreClientBuilder::new(identity)
    }

    /// Build a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns configuration errors for missing identity settings or an unreadable
    /// key file.
    pub fn from_config(config: &StoreConfig) -> crate::Result<Self> {
        let mut builder = Self::builder(config.signing_identity()?)
            .base_url(config.base_url()?)
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .pagination_delay(Duration::from_millis(config.pagination_delay_ms))
            .trust_store(Arc::new(TrustStore::new(config.trust.store_config())));
        builder.backoff = config.http.retry.backoff();
        if let Some(limit) = config.http.requests_per_minute.filter(|limit| *limit > 0) {
            builder = builder.requests_per_minute(limit);
        }
        builder.build()
    }

    /// The bearer token issuer
    pub fn token_issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// The signed-payload verifier
    pub fn verifier(&self) -> &Arc<SignedPayloadVerifier> {
        &self.verifier
    }

    /// API base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Cancel every in-flight and future call of this client and its clones
    pub fn shutdown(&self) {
        info!("Store client shutting down");
        self.shutdown.cancel();
    }

    /// True once [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// Statuses of all subscriptions of a customer
    ///
    /// # Errors
    ///
    /// [`Error::Api`] for API error bodies, [`Error::Http`] for transport, status or
    /// decoding failures, [`Error::Auth`] if no token can be minted.
    pub async fn get_all_subscription_statuses(
        &self,
        original_transaction_id: &str,
    ) -> crate::Result<StatusResponse> {
        self.fetch(
            Route::SubscriptionStatuses(original_transaction_id),
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    /// A single signed transaction
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn get_transaction_info(
        &self,
        transaction_id: &str,
    ) -> crate::Result<TransactionInfoResponse> {
        self.fetch(
            Route::TransactionInfo(transaction_id),
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    /// Transactions of a customer's order, by the id on their receipt email
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn lookup_order_id(&self, order_id: &str) -> crate::Result<OrderLookupResponse> {
        self.fetch(
            Route::OrderLookup(order_id),
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    /// Every page of a customer's transaction history
    ///
    /// # Errors
    ///
    /// Stops at the first failing page; the error keeps the pages fetched so far.
    pub async fn get_transaction_history(
        &self,
        original_transaction_id: &str,
        query: &TransactionHistoryQuery,
    ) -> Result<Vec<HistoryResponse>, PaginationError<HistoryResponse, Error>> {
        self.fetch_pages(
            Route::TransactionHistory(original_transaction_id),
            query.to_pairs(),
            "revision",
            None::<()>,
        )
        .await
    }

    /// Every page of a customer's refunded transactions
    ///
    /// # Errors
    ///
    /// Stops at the first failing page; the error keeps the pages fetched so far.
    pub async fn get_refund_history(
        &self,
        original_transaction_id: &str,
    ) -> Result<Vec<RefundLookupResponse>, PaginationError<RefundLookupResponse, Error>> {
        self.fetch_pages(
            Route::RefundHistory(original_transaction_id),
            Query::new(),
            "revision",
            None::<()>,
        )
        .await
    }

    /// Notifications sent to the server in a date range, items of all pages in order
    ///
    /// # Errors
    ///
    /// Stops at the first failing page; the error keeps the pages fetched so far.
    pub async fn get_notification_history(
        &self,
        request: &NotificationHistoryRequest,
    ) -> Result<
        Vec<NotificationHistoryResponseItem>,
        PaginationError<NotificationHistoryResponse, Error>,
    > {
        let pages = self
            .fetch_pages::<NotificationHistoryResponse, _>(
                Route::NotificationHistory,
                Query::new(),
                "paginationToken",
                Some(request.clone()),
            )
            .await?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.notification_history)
            .collect())
    }

    /// Answer a `CONSUMPTION_REQUEST` notification
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn send_consumption_info(
        &self,
        original_transaction_id: &str,
        request: &ConsumptionRequest,
    ) -> crate::Result<StatusCode> {
        self.submit(
            Route::ConsumptionInfo(original_transaction_id),
            request.clone(),
            Replay::Allowed,
        )
        .await
    }

    /// Extend one subscription's renewal date
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn extend_subscription_renewal_date(
        &self,
        original_transaction_id: &str,
        request: &ExtendRenewalDateRequest,
    ) -> crate::Result<StatusCode> {
        self.submit(
            Route::ExtendRenewalDate(original_transaction_id),
            request.clone(),
            Replay::Allowed,
        )
        .await
    }

    /// Extend the renewal date of every active subscriber of a product
    ///
    /// Sent at most once: transient failures are returned, never retried.
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn extend_subscription_renewal_date_for_all(
        &self,
        request: &MassExtendRenewalDateRequest,
    ) -> crate::Result<StatusCode> {
        self.submit(Route::MassExtendRenewalDate, request.clone(), Replay::Never)
            .await
    }

    /// Progress of a mass renewal-date extension
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn get_subscription_renewal_data_status(
        &self,
        product_id: &str,
        request_identifier: &str,
    ) -> crate::Result<MassExtendRenewalDateStatusResponse> {
        self.fetch(
            Route::MassExtendStatus {
                product_id,
                request_identifier,
            },
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    /// Ask the server to send a test notification
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn request_test_notification(&self) -> crate::Result<SendTestNotificationResponse> {
        self.fetch(
            Route::TestNotification,
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    /// Delivery state of a test notification
    ///
    /// # Errors
    ///
    /// See [`get_all_subscription_statuses`](Self::get_all_subscription_statuses).
    pub async fn get_test_notification_status(
        &self,
        test_notification_token: &str,
    ) -> crate::Result<CheckTestNotificationResponse> {
        self.fetch(
            Route::TestNotificationStatus(test_notification_token),
            Query::new(),
            None::<()>,
            &self.call_token(),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Pipeline assembly
    // -----------------------------------------------------------------------

    fn call_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    fn request(&self, route: Route<'_>, query: &[(&'static str, String)]) -> crate::Result<Request> {
        let mut url = route
            .url(&self.base_url)
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        debug!(method = %route.method(), url = %url, "Calling App Store Server API");
        http::Request::builder()
            .method(route.method())
            .uri(url.as_str())
            .body(Body::Empty)
            .map_err(|e| HttpError::InvalidRequest(e.to_string()).into())
    }

    /// Append the shared inner stages and the transport
    fn finish(
        &self,
        builder: PipelineBuilder,
        allowed: &[StatusCode],
        require_body: bool,
    ) -> Pipeline {
        builder
            .optional_layer(self.backoff.clone().map(Retry::new))
            .optional_layer(self.limiter.clone().map(RateLimit::new))
            .optional_layer(require_body.then_some(RequireBody))
            .layer(RequireStatus::new(allowed.iter().copied()))
            .layer(Authenticate::new(self.issuer.clone()))
            .layer(SetHeader::new(USER_AGENT, self.user_agent.clone()))
            .layer(SetHeader::new(
                ACCEPT,
                HeaderValue::from_static("application/json"),
            ))
            .service(self.transport.clone())
    }

    /// One request whose JSON answer decodes into `T`
    async fn fetch<T, B>(
        &self,
        route: Route<'_>,
        query: Query,
        body: Option<B>,
        cancel: &CancellationToken,
    ) -> crate::Result<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        B: Serialize + Send + Sync + 'static,
    {
        let pipeline = self.finish(
            Pipeline::builder()
                .optional_layer(body.map(EncodeBody::json))
                .layer(DecodeBody::<T>::json()),
            &[StatusCode::OK],
            true,
        );
        let request = self.request(route, &query)?;
        let mut response = pipeline.execute(request, cancel).await?;
        match response.extensions_mut().remove::<Decoded<T>>() {
            Some(Decoded(value)) => Ok(value),
            None => Err(HttpError::EmptyResponseBody.into()),
        }
    }

    /// One request whose status is the whole answer
    async fn submit<B>(&self, route: Route<'_>, body: B, replay: Replay) -> crate::Result<StatusCode>
    where
        B: Serialize + Send + Sync + 'static,
    {
        let encode = EncodeBody::json(body);
        let encode = match replay {
            Replay::Allowed => encode,
            Replay::Never => encode.one_shot(),
        };
        let pipeline = self.finish(Pipeline::builder().layer(encode), ACCEPTED_WRITE, false);
        let request = self.request(route, &Query::new())?;
        let response = pipeline.execute(request, &self.call_token()).await?;
        Ok(response.status())
    }

    /// Follow the cursor in `cursor_param` until the last page
    async fn fetch_pages<P, B>(
        &self,
        route: Route<'_>,
        query: Query,
        cursor_param: &'static str,
        body: Option<B>,
    ) -> Result<Vec<P>, PaginationError<P, Error>>
    where
        P: Page + DeserializeOwned + Clone + Send + Sync + 'static,
        B: Serialize + Clone + Send + Sync + 'static,
    {
        let cancel = self.call_token();
        self.paginator
            .collect(&cancel, |cursor| {
                let mut query = query.clone();
                if let Some(cursor) = cursor {
                    query.push((cursor_param, cursor));
                }
                let body = body.clone();
                let cancel = cancel.clone();
                async move { self.fetch::<P, B>(route, query, body, &cancel).await }
            })
            .await
    }
}

/// Builder for [`StoreClient`]
pub struct StoreClientBuilder {
    identity: SigningIdentity,
    base_url: Option<Url>,
    environment: Environment,
    transport: Option<Next>,
    trust: Option<Arc<TrustStore>>,
    requests_per_minute: Option<usize>,
    backoff: Option<JitterBackoff>,
    pagination_delay: Duration,
    user_agent: String,
    timeout: Duration,
    verification_time: Option<SystemTime>,
}

impl fmt::Debug for StoreClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClientBuilder")
            .field("identity", &self.identity)
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl StoreClientBuilder {
    fn new(identity: SigningIdentity) -> Self {
        let defaults = StoreConfig::default();
        Self {
            identity,
            base_url: None,
            environment: Environment::Production,
            transport: None,
            trust: None,
            requests_per_minute: None,
            backoff: defaults.http.retry.backoff(),
            pagination_delay: Duration::from_millis(defaults.pagination_delay_ms),
            user_agent: defaults.http.user_agent,
            timeout: Duration::from_secs(defaults.http.timeout_secs),
            verification_time: None,
        }
    }

    /// Call the host of `environment`
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Call `url` instead of the environment's host
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Send through `transport` instead of a reqwest client
    pub fn transport(mut self, transport: Next) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Verify signed payloads against `trust`
    pub fn trust_store(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Admit at most `limit` requests per rolling minute across all calls
    pub fn requests_per_minute(mut self, limit: usize) -> Self {
        self.requests_per_minute = Some(limit);
        self
    }

    /// Retry transient failures with `backoff`
    pub fn retry(mut self, backoff: JitterBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Never retry
    pub fn no_retry(mut self) -> Self {
        self.backoff = None;
        self
    }

    /// Pause between page requests
    pub fn pagination_delay(mut self, delay: Duration) -> Self {
        self.pagination_delay = delay;
        self
    }

    /// `User-Agent` header value
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Per-request timeout of the default transport
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check certificate validity at `at` instead of now
    pub fn verification_time(mut self, at: SystemTime) -> Self {
        self.verification_time = Some(at);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unusable user agent and
    /// [`Error::Http`] if the default transport cannot be created.
    pub fn build(self) -> crate::Result<StoreClient> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(self.environment.host()).map_err(|e| ConfigError::Invalid {
                field: "environment",
                reason: e.to_string(),
            })?,
        };
        let user_agent =
            HeaderValue::from_str(&self.user_agent).map_err(|e| ConfigError::Invalid {
                field: "user_agent",
                reason: e.to_string(),
            })?;
        let transport: Next = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_timeout(self.timeout)?),
        };
        let trust = self
            .trust
            .unwrap_or_else(|| Arc::new(TrustStore::new(TrustStoreConfig::default())));
        let mut verifier = SignedPayloadVerifier::new(trust);
        if let Some(at) = self.verification_time {
            verifier = verifier.with_verification_time(at);
        }
        let limiter = self
            .requests_per_minute
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(RateLimiter::per_minute(limit)));

        info!(
            base_url = %base_url,
            kid = self.identity.key_id(),
            rate_limit = ?limiter.as_ref().map(|l| l.limit()),
            retry = self.backoff.is_some(),
            "Store client ready"
        );

        Ok(StoreClient {
            issuer: Arc::new(TokenIssuer::new(self.identity)),
            verifier: Arc::new(verifier),
            transport,
            limiter,
            backoff: self.backoff,
            base_url,
            user_agent,
            paginator: Paginator::new(self.pagination_delay),
            shutdown: CancellationToken::new(),
        })
    }
}
