use std::fmt::{Debug, Display};
use std::io::Error as IoError;

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError, UrlencodedError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use derivative::Derivative;
use mongodb::bson::ser::Error as BsonError;
use mongodb::error::Error as DatabaseError;
use serde::{Serialize, Serializer};

use crate::campaign::{CampaignId, CampaignStatus};
use crate::channel::Channel;
use crate::compliance::ComplianceRuleId;
use crate::contact::ContactId;
use crate::keyword::KeywordId;
use crate::message::{MessageId, MessageStatus};
use crate::provider::ProviderId;
use crate::ratelimit::RateLimitId;
use crate::suppression::SuppressionId;
use crate::user::UserId;
use crate::variant::VariantId;

/// Every failure the service reports. Foreign error payloads are rendered by
/// their `Display` and never take part in equality.
#[derive(Debug, Derivative, Serialize)]
#[derivative(PartialEq)]
#[serde(untagged)]
pub enum Error {
    // 400
    #[serde(serialize_with = "display")]
    InvalidJson(#[derivative(PartialEq = "ignore")] JsonPayloadError),
    #[serde(serialize_with = "display")]
    InvalidPath(#[derivative(PartialEq = "ignore")] PathError),
    #[serde(serialize_with = "display")]
    InvalidForm(#[derivative(PartialEq = "ignore")] UrlencodedError),
    #[serde(serialize_with = "display")]
    InvalidQuery(#[derivative(PartialEq = "ignore")] QueryPayloadError),
    InvalidEmail {
        email: String,
    },
    InvalidPhone {
        phone: String,
    },
    ContactHasNoAddress,
    MissingCampaignName,
    InvalidChannels {
        channels: Vec<Channel>,
    },
    ScheduleInPast {
        campaign_id: CampaignId,
        send_at: DateTime<Utc>,
    },
    InvalidTrafficPercentage {
        traffic_percentage: u8,
    },
    InvalidRetryPolicy {
        initial_backoff_ms: i64,
        max_backoff_ms: i64,
        backoff_multiplier: f64,
    },
    DuplicateRoutingProvider {
        provider_id: ProviderId,
    },
    ProviderChannelMismatch {
        provider_id: ProviderId,
        provider_channel: Channel,
        channel: Channel,
    },
    InvalidRateLimitWindow {
        max_requests: u32,
        time_window_seconds: i64,
    },
    InvalidKeyword {
        word: String,
    },
    KeywordReserved {
        word: String,
    },

    // 401
    MissingBearerToken,
    InvalidBearerToken,

    // 404
    PathNotFound,
    UserNotFound {
        user_id: UserId,
    },
    ContactNotFound {
        contact_id: ContactId,
    },
    SuppressionNotFound {
        suppression_id: SuppressionId,
    },
    ComplianceRuleNotFound {
        rule_id: ComplianceRuleId,
    },
    ProviderNotFound {
        provider_id: ProviderId,
    },
    RoutingConfigNotFound {
        channel: Channel,
    },
    RateLimitNotFound {
        rate_limit_id: RateLimitId,
    },
    CampaignNotFound {
        campaign_id: CampaignId,
    },
    VariantNotFound {
        campaign_id: CampaignId,
        variant_id: VariantId,
    },
    MessageNotFound {
        message_id: MessageId,
    },
    KeywordNotFound {
        keyword_id: KeywordId,
    },

    // 409
    ConcurrentModificationDetected,
    EmailAlreadyRegistered {
        email: String,
    },
    ContactAddressInUse {
        address: String,
        contact_id: ContactId,
    },
    AddressAlreadySuppressed {
        address: String,
        channel: Option<Channel>,
        suppression_id: SuppressionId,
    },
    ProviderNameInUse {
        name: String,
        provider_id: ProviderId,
    },
    ProviderInUse {
        provider_id: ProviderId,
        channel: Channel,
    },
    NoActiveRoute {
        channel: Channel,
    },
    RateLimitAlreadyExists {
        rate_limit_id: RateLimitId,
    },
    CampaignNotEditable {
        campaign_id: CampaignId,
        status: CampaignStatus,
    },
    CampaignIsActive {
        campaign_id: CampaignId,
        status: CampaignStatus,
    },
    InvalidCampaignTransition {
        campaign_id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    },
    CampaignContentMissing {
        campaign_id: CampaignId,
    },
    CampaignAudienceMissing {
        campaign_id: CampaignId,
    },
    CampaignScheduleMissing {
        campaign_id: CampaignId,
    },
    CampaignNotAbTest {
        campaign_id: CampaignId,
    },
    CannotDeclareWinner {
        campaign_id: CampaignId,
        status: CampaignStatus,
    },
    CampaignNotSendable {
        campaign_id: CampaignId,
        status: CampaignStatus,
    },
    VariantTrafficExceeded {
        campaign_id: CampaignId,
        total: u32,
    },
    VariantTrafficIncomplete {
        campaign_id: CampaignId,
        total: u32,
    },
    InvalidMessageTransition {
        message_id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },
    MessageNotDelivered {
        message_id: MessageId,
        status: MessageStatus,
    },
    KeywordAlreadyExists {
        word: String,
        keyword_id: KeywordId,
    },

    // 429
    RateLimitExceeded {
        rate_limit_id: RateLimitId,
        max_requests: u32,
        reset_at: DateTime<Utc>,
    },

    // 500
    FailedToIssueToken,
    ExistentialState(String),
    #[serde(serialize_with = "display")]
    FailedDatabaseCall(#[derivative(PartialEq = "ignore")] DatabaseError),
    #[serde(serialize_with = "display")]
    FailedToSerializeToBson(#[derivative(PartialEq = "ignore")] BsonError),
    #[serde(serialize_with = "display")]
    IoError(#[derivative(PartialEq = "ignore")] IoError),
}

impl Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "E4001000",
            Error::InvalidPath(_) => "E4001001",
            Error::InvalidForm(_) => "E4001002",
            Error::InvalidQuery(_) => "E4001003",
            Error::InvalidEmail { .. } => "E4001004",
            Error::InvalidPhone { .. } => "E4001005",
            Error::ContactHasNoAddress => "E4001006",
            Error::MissingCampaignName => "E4001007",
            Error::InvalidChannels { .. } => "E4001008",
            Error::ScheduleInPast { .. } => "E4001009",
            Error::InvalidTrafficPercentage { .. } => "E4001010",
            Error::InvalidRetryPolicy { .. } => "E4001011",
            Error::DuplicateRoutingProvider { .. } => "E4001012",
            Error::ProviderChannelMismatch { .. } => "E4001013",
            Error::InvalidRateLimitWindow { .. } => "E4001014",
            Error::InvalidKeyword { .. } => "E4001015",
            Error::KeywordReserved { .. } => "E4001016",
            Error::MissingBearerToken => "E4011000",
            Error::InvalidBearerToken => "E4011001",
            Error::PathNotFound => "E4041000",
            Error::UserNotFound { .. } => "E4041001",
            Error::ContactNotFound { .. } => "E4041002",
            Error::SuppressionNotFound { .. } => "E4041003",
            Error::ComplianceRuleNotFound { .. } => "E4041004",
            Error::ProviderNotFound { .. } => "E4041005",
            Error::RoutingConfigNotFound { .. } => "E4041006",
            Error::RateLimitNotFound { .. } => "E4041007",
            Error::CampaignNotFound { .. } => "E4041008",
            Error::VariantNotFound { .. } => "E4041009",
            Error::MessageNotFound { .. } => "E4041010",
            Error::KeywordNotFound { .. } => "E4041011",
            Error::ConcurrentModificationDetected => "E4091000",
            Error::EmailAlreadyRegistered { .. } => "E4091001",
            Error::ContactAddressInUse { .. } => "E4091002",
            Error::AddressAlreadySuppressed { .. } => "E4091003",
            Error::ProviderNameInUse { .. } => "E4091004",
            Error::ProviderInUse { .. } => "E4091005",
            Error::NoActiveRoute { .. } => "E4091006",
            Error::RateLimitAlreadyExists { .. } => "E4091007",
            Error::CampaignNotEditable { .. } => "E4091008",
            Error::CampaignIsActive { .. } => "E4091009",
            Error::InvalidCampaignTransition { .. } => "E4091010",
            Error::CampaignContentMissing { .. } => "E4091011",
            Error::CampaignAudienceMissing { .. } => "E4091012",
            Error::CampaignScheduleMissing { .. } => "E4091013",
            Error::CampaignNotAbTest { .. } => "E4091014",
            Error::CannotDeclareWinner { .. } => "E4091015",
            Error::CampaignNotSendable { .. } => "E4091016",
            Error::VariantTrafficExceeded { .. } => "E4091017",
            Error::VariantTrafficIncomplete { .. } => "E4091018",
            Error::InvalidMessageTransition { .. } => "E4091019",
            Error::MessageNotDelivered { .. } => "E4091020",
            Error::KeywordAlreadyExists { .. } => "E4091021",
            Error::RateLimitExceeded { .. } => "E4291000",
            Error::FailedToIssueToken => "E5001000",
            Error::ExistentialState(_) => "E5001001",
            Error::FailedDatabaseCall(_) => "E5001002",
            Error::FailedToSerializeToBson(_) => "E5001003",
            Error::IoError(_) => "E5001004",
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "The given json could not be parsed",
            Error::InvalidPath(_) => "The given path could not be parsed",
            Error::InvalidForm(_) => "The given form could not be parsed",
            Error::InvalidQuery(_) => "The given query could not be parsed",
            Error::InvalidEmail { .. } => "The given email address is not valid",
            Error::InvalidPhone { .. } => "The given phone number is not valid",
            Error::ContactHasNoAddress => "A contact needs at least a phone number or an email",
            Error::MissingCampaignName => "A campaign needs a non-empty name",
            Error::InvalidChannels { .. } => {
                "A campaign needs at least one channel and no channel twice"
            }
            Error::ScheduleInPast { .. } => "The requested send time is not in the future",
            Error::InvalidTrafficPercentage { .. } => {
                "A traffic percentage must be between 0 and 100"
            }
            Error::InvalidRetryPolicy { .. } => "The given retry policy is not consistent",
            Error::DuplicateRoutingProvider { .. } => {
                "The same provider appears more than once in the routing"
            }
            Error::ProviderChannelMismatch { .. } => {
                "The given provider does not serve the routed channel"
            }
            Error::InvalidRateLimitWindow { .. } => {
                "A rate limit needs a positive request count and window"
            }
            Error::InvalidKeyword { .. } => "A keyword must be a single word",
            Error::KeywordReserved { .. } => "The given keyword is reserved",
            Error::MissingBearerToken => "The request does not carry a bearer token",
            Error::InvalidBearerToken => "The given bearer token is not valid",
            Error::PathNotFound => "The requested path does not exist",
            Error::UserNotFound { .. } => "The requested user does not exist",
            Error::ContactNotFound { .. } => "The requested contact does not exist",
            Error::SuppressionNotFound { .. } => "The requested suppression does not exist",
            Error::ComplianceRuleNotFound { .. } => {
                "The requested compliance rule does not exist"
            }
            Error::ProviderNotFound { .. } => "The requested provider does not exist",
            Error::RoutingConfigNotFound { .. } => {
                "The requested channel does not have a routing config"
            }
            Error::RateLimitNotFound { .. } => "The requested rate limit does not exist",
            Error::CampaignNotFound { .. } => "The requested campaign does not exist",
            Error::VariantNotFound { .. } => "The requested variant is not in the campaign",
            Error::MessageNotFound { .. } => "The requested message does not exist",
            Error::KeywordNotFound { .. } => "The requested keyword does not exist",
            Error::ConcurrentModificationDetected => {
                "The server detected a concurrent modification"
            }
            Error::EmailAlreadyRegistered { .. } => "The given email is already registered",
            Error::ContactAddressInUse { .. } => {
                "The given address already belongs to another contact"
            }
            Error::AddressAlreadySuppressed { .. } => "The given address is already suppressed",
            Error::ProviderNameInUse { .. } => "The given provider name is already taken",
            Error::ProviderInUse { .. } => "The requested provider is still used for routing",
            Error::NoActiveRoute { .. } => {
                "The requested channel does not have an active provider"
            }
            Error::RateLimitAlreadyExists { .. } => {
                "The given subject already has a rate limit"
            }
            Error::CampaignNotEditable { .. } => {
                "The requested campaign can no longer be edited"
            }
            Error::CampaignIsActive { .. } => "The requested campaign is still active",
            Error::InvalidCampaignTransition { .. } => {
                "The requested campaign cannot move to that status"
            }
            Error::CampaignContentMissing { .. } => "The requested campaign has no content",
            Error::CampaignAudienceMissing { .. } => "The requested campaign has no audience",
            Error::CampaignScheduleMissing { .. } => {
                "The requested campaign has no send time"
            }
            Error::CampaignNotAbTest { .. } => "The requested campaign is not an A/B test",
            Error::CannotDeclareWinner { .. } => {
                "A winner can only be declared for a running or completed campaign"
            }
            Error::CampaignNotSendable { .. } => {
                "The requested campaign is not accepting messages"
            }
            Error::VariantTrafficExceeded { .. } => {
                "The active variants would receive more than all traffic"
            }
            Error::VariantTrafficIncomplete { .. } => {
                "The active variants do not receive exactly all traffic"
            }
            Error::InvalidMessageTransition { .. } => {
                "The requested message cannot move to that status"
            }
            Error::MessageNotDelivered { .. } => "The requested message was never delivered",
            Error::KeywordAlreadyExists { .. } => "The given keyword is already defined",
            Error::RateLimitExceeded { .. } => "The requested rate limit is exhausted",
            Error::FailedToIssueToken => "An error occurred when issuing a token",
            Error::ExistentialState(_) => "The server reached a state it should not be in",
            Error::FailedDatabaseCall { .. } => {
                "An error occurred when communicating with the database"
            }
            Error::FailedToSerializeToBson { .. } => {
                "An error occurred when serializing an object to bson"
            }
            Error::IoError { .. } => "An error occurred during an I/O operation",
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match &self.error_code()[1..4] {
            "400" => StatusCode::BAD_REQUEST,
            "401" => StatusCode::UNAUTHORIZED,
            "404" => StatusCode::NOT_FOUND,
            "409" => StatusCode::CONFLICT,
            "429" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error_code: &'static str,
            error_message: &'static str,
            error_meta: &'a Error,
        }

        HttpResponse::build(self.status_code()).json(&ErrorBody {
            error_code: self.error_code(),
            error_message: self.error_message(),
            error_meta: self,
        })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl From<DatabaseError> for Error {
    fn from(error: DatabaseError) -> Error {
        Error::FailedDatabaseCall(error)
    }
}

impl From<BsonError> for Error {
    fn from(error: BsonError) -> Error {
        Error::FailedToSerializeToBson(error)
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidJson(err) => Some(err),
            Error::InvalidPath(err) => Some(err),
            Error::InvalidForm(err) => Some(err),
            Error::InvalidQuery(err) => Some(err),
            Error::FailedDatabaseCall(err) => Some(err),
            Error::FailedToSerializeToBson(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

fn display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_code() {
        assert_eq!(Error::MissingCampaignName.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::InvalidBearerToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::PathNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::ConcurrentModificationDetected.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::RateLimitExceeded {
                rate_limit_id: RateLimitId::new(),
                max_requests: 1,
                reset_at: Utc::now(),
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Error::FailedToIssueToken.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn meta_carries_the_variant_fields() {
        let contact_id = ContactId::new();
        let error = Error::ContactNotFound { contact_id };

        let meta = serde_json::to_value(&error).unwrap();

        assert_eq!(meta["contact_id"], contact_id.to_string());
    }
}
