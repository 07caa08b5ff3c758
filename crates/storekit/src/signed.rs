//! Verified decoding of signed payloads
//!
//! Every helper waits for the trust store to finish initializing, then checks the
//! certificate chain and signature before any claim is returned.

use serde::de::DeserializeOwned;
use storekit_trust::decode_payload_unverified;
use tracing::{debug, warn};

use crate::client::StoreClient;
use crate::models::{JwsRenewalInfo, JwsTransaction, NotificationPayload, SignedPayload};

impl StoreClient {
    /// Load the trust store now instead of on the first verification
    pub async fn init_trust(&self) {
        self.verifier().trust_store().init().await;
    }

    async fn verify<T: DeserializeOwned>(&self, token: &str) -> crate::Result<T> {
        self.init_trust().await;
        Ok(self.verifier().verify(token)?)
    }

    /// Verify and decode a version 2 server notification (`signedPayload`)
    ///
    /// # Errors
    ///
    /// [`Error::Verify`](crate::Error::Verify) if the chain or signature is not valid
    /// or the claims do not describe a notification.
    pub async fn parse_notification_v2(&self, token: &str) -> crate::Result<NotificationPayload> {
        let payload: NotificationPayload = self.verify(token).await?;
        debug!(
            notification_type = ?payload.notification_type,
            uuid = %payload.notification_uuid,
            "Verified notification"
        );
        Ok(payload)
    }

    /// Verify and decode a signed transaction
    ///
    /// # Errors
    ///
    /// [`Error::Verify`](crate::Error::Verify) if the chain or signature is not valid.
    pub async fn parse_signed_transaction(&self, token: &str) -> crate::Result<JwsTransaction> {
        self.verify(token).await
    }

    /// Verify and decode a list of signed transactions, skipping entries that fail
    pub async fn parse_signed_transactions<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Vec<JwsTransaction> {
        self.init_trust().await;
        tokens
            .iter()
            .enumerate()
            .filter_map(
                |(index, token)| match self.verifier().verify::<JwsTransaction>(token.as_ref()) {
                    Ok(transaction) => Some(transaction),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping signed transaction that failed verification");
                        None
                    }
                },
            )
            .collect()
    }

    /// Verify and decode signed subscription renewal info
    ///
    /// # Errors
    ///
    /// [`Error::Verify`](crate::Error::Verify) if the chain or signature is not valid.
    pub async fn parse_signed_renewal_info(&self, token: &str) -> crate::Result<JwsRenewalInfo> {
        self.verify(token).await
    }

    /// Verify a signed payload of unknown kind and decode it by the claims it carries
    ///
    /// A `transactionId` claim makes it a transaction, a `renewalDate` claim renewal
    /// info. Anything else verifies to [`SignedPayload::Unknown`].
    ///
    /// # Errors
    ///
    /// [`Error::Verify`](crate::Error::Verify) if the token is malformed or the chain
    /// or signature is not valid.
    pub async fn parse_jws_encode_string(&self, token: &str) -> crate::Result<SignedPayload> {
        let claims = decode_payload_unverified(token)?;
        if claims.get("transactionId").is_some() {
            let transaction: JwsTransaction = self.verify(token).await?;
            Ok(SignedPayload::Transaction(Box::new(transaction)))
        } else if claims.get("renewalDate").is_some() {
            let renewal: JwsRenewalInfo = self.verify(token).await?;
            Ok(SignedPayload::RenewalInfo(Box::new(renewal)))
        } else {
            self.verify::<serde_json::Value>(token).await?;
            Ok(SignedPayload::Unknown)
        }
    }
}
