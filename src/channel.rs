use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Channel {
    Sms,
    Mms,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Sms, Channel::Mms, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "SMS",
            Channel::Mms => "MMS",
            Channel::Email => "EMAIL",
        }
    }

    /// SMS and MMS are delivered to a phone number, email to an address.
    pub fn uses_phone(&self) -> bool {
        matches!(self, Channel::Sms | Channel::Mms)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_screaming_names() {
        assert_eq!(serde_json::to_string(&Channel::Email).unwrap(), "\"EMAIL\"");
        assert_eq!(
            serde_json::from_str::<Channel>("\"MMS\"").unwrap(),
            Channel::Mms
        );
    }
}
