//! Hosts and routes of the App Store Server API

use http::Method;
use url::Url;

use crate::models::Environment;

/// Production API host
pub const PRODUCTION_HOST: &str = "https://api.storekit.itunes.apple.com";

/// Sandbox API host
pub const SANDBOX_HOST: &str = "https://api.storekit-sandbox.itunes.apple.com";

impl Environment {
    /// API host serving this environment
    pub fn host(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_HOST,
            Self::Sandbox => SANDBOX_HOST,
        }
    }
}

/// An API operation and its path parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    SubscriptionStatuses(&'a str),
    TransactionInfo(&'a str),
    OrderLookup(&'a str),
    TransactionHistory(&'a str),
    RefundHistory(&'a str),
    ConsumptionInfo(&'a str),
    ExtendRenewalDate(&'a str),
    MassExtendRenewalDate,
    MassExtendStatus {
        product_id: &'a str,
        request_identifier: &'a str,
    },
    NotificationHistory,
    TestNotification,
    TestNotificationStatus(&'a str),
}

impl<'a> Route<'a> {
    pub(crate) fn method(&self) -> Method {
        match self {
            Self::ConsumptionInfo(_) | Self::ExtendRenewalDate(_) => Method::PUT,
            Self::MassExtendRenewalDate | Self::NotificationHistory | Self::TestNotification => {
                Method::POST
            }
            _ => Method::GET,
        }
    }

    /// Path segments; caller-supplied ids are single segments and get percent-encoded
    fn segments(&self) -> Vec<&'a str> {
        let mut segments = vec!["inApps"];
        match *self {
            Self::SubscriptionStatuses(id) => segments.extend(["v1", "subscriptions", id]),
            Self::TransactionInfo(id) => segments.extend(["v1", "transactions", id]),
            Self::OrderLookup(id) => segments.extend(["v1", "lookup", id]),
            Self::TransactionHistory(id) => segments.extend(["v1", "history", id]),
            Self::RefundHistory(id) => segments.extend(["v2", "refund", "lookup", id]),
            Self::ConsumptionInfo(id) => {
                segments.extend(["v1", "transactions", "consumption", id]);
            }
            Self::ExtendRenewalDate(id) => segments.extend(["v1", "subscriptions", "extend", id]),
            Self::MassExtendRenewalDate => {
                segments.extend(["v1", "subscriptions", "extend", "mass", ""]);
            }
            Self::MassExtendStatus {
                product_id,
                request_identifier,
            } => segments.extend([
                "v1",
                "subscriptions",
                "extend",
                "mass",
                product_id,
                request_identifier,
            ]),
            Self::NotificationHistory => segments.extend(["v1", "notifications", "history"]),
            Self::TestNotification => segments.extend(["v1", "notifications", "test"]),
            Self::TestNotificationStatus(token) => {
                segments.extend(["v1", "notifications", "test", token]);
            }
        }
        segments
    }

    /// Absolute URL under `base`, keeping any path prefix `base` carries
    pub(crate) fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
        let mut url = base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(self.segments());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn production() -> Url {
        Url::parse(PRODUCTION_HOST).unwrap()
    }

    #[test]
    fn test_routes() {
        let cases = [
            (Route::SubscriptionStatuses("1000"), "/inApps/v1/subscriptions/1000"),
            (Route::TransactionInfo("1000"), "/inApps/v1/transactions/1000"),
            (Route::OrderLookup("MK5TTTVWJH"), "/inApps/v1/lookup/MK5TTTVWJH"),
            (Route::TransactionHistory("1000"), "/inApps/v1/history/1000"),
            (Route::RefundHistory("1000"), "/inApps/v2/refund/lookup/1000"),
            (
                Route::ConsumptionInfo("1000"),
                "/inApps/v1/transactions/consumption/1000",
            ),
            (
                Route::ExtendRenewalDate("1000"),
                "/inApps/v1/subscriptions/extend/1000",
            ),
            (
                Route::MassExtendRenewalDate,
                "/inApps/v1/subscriptions/extend/mass/",
            ),
            (
                Route::MassExtendStatus {
                    product_id: "com.example.monthly",
                    request_identifier: "req-1",
                },
                "/inApps/v1/subscriptions/extend/mass/com.example.monthly/req-1",
            ),
            (Route::NotificationHistory, "/inApps/v1/notifications/history"),
            (Route::TestNotification, "/inApps/v1/notifications/test"),
            (
                Route::TestNotificationStatus("tok"),
                "/inApps/v1/notifications/test/tok",
            ),
        ];
        for (route, path) in cases {
            assert_eq!(route.url(&production()).unwrap().path(), path, "{route:?}");
        }
    }

    #[test]
    fn test_ids_cannot_escape_their_segment() {
        let url = Route::TransactionInfo("../../v2/x?y").url(&production()).unwrap();
        assert_eq!(url.path(), "/inApps/v1/transactions/..%2F..%2Fv2%2Fx%3Fy");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_base_prefix_kept() {
        let base = Url::parse("http://127.0.0.1:8080/mock/").unwrap();
        let url = Route::TestNotification.url(&base).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/mock/inApps/v1/notifications/test");
    }

    #[test]
    fn test_methods() {
        assert_eq!(Route::ConsumptionInfo("1").method(), Method::PUT);
        assert_eq!(Route::NotificationHistory.method(), Method::POST);
        assert_eq!(Route::TransactionHistory("1").method(), Method::GET);
    }

    #[test]
    fn test_environment_hosts() {
        assert_eq!(Environment::Sandbox.host(), SANDBOX_HOST);
        assert_eq!(Environment::Production.host(), PRODUCTION_HOST);
    }
}
