use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::consent::ConsentStatusKind;
use crate::contact::FrequencyPeriod;
use crate::suppression::{SuppressionId, SuppressionReason};

/// A reason a contact may not be messaged on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Violation {
    NoAddressForChannel {
        channel: Channel,
    },
    ConsentNotGranted {
        channel: Channel,
        status: Option<ConsentStatusKind>,
    },
    AddressSuppressed {
        address: String,
        suppression_id: SuppressionId,
        reason: SuppressionReason,
    },
    FrequencyCapReached {
        period: FrequencyPeriod,
        limit: u32,
        current: u32,
    },
}
