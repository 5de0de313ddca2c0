//! Blood request broadcasts and the topic names they are addressed to.

use time::OffsetDateTime;

use crate::error::NotificationError;
use crate::types::{BloodRequestDetails, MessageContent, MessageData};

/// Prefix shared by all blood-type topics
pub const CATEGORY_TOPIC_PREFIX: &str = "category_";

const DEFAULT_REQUESTER: &str = "Someone";
const DEFAULT_URGENCY: &str = "normal";

/// Topic name for a blood type code.
///
/// Dashboards subscribe to these names directly, so the mapping must stay
/// stable: `A+` becomes `category_apos`, `O-` becomes `category_oneg`.
pub fn category_topic(blood_type: &str) -> String {
    let code = blood_type
        .to_lowercase()
        .replace('+', "pos")
        .replace('-', "neg");
    format!("{CATEGORY_TOPIC_PREFIX}{code}")
}

/// An urgent request for donors of one blood type
#[derive(Debug, Clone, Default)]
pub struct BloodRequest {
    pub blood_type: String,
    pub location: String,
    pub urgency: Option<String>,
    pub requester_name: Option<String>,
    pub hospital_name: Option<String>,
}

impl BloodRequest {
    pub fn new(blood_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            blood_type: blood_type.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), NotificationError> {
        if self.blood_type.trim().is_empty() || self.location.trim().is_empty() {
            return Err(NotificationError::validation(
                "bloodType and location are required",
            ));
        }
        Ok(())
    }

    pub fn topic(&self) -> String {
        category_topic(&self.blood_type)
    }

    /// Request details with defaults applied
    pub fn details(&self) -> BloodRequestDetails {
        BloodRequestDetails {
            blood_type: self.blood_type.clone(),
            location: self.location.clone(),
            urgency: non_blank(&self.urgency).unwrap_or(DEFAULT_URGENCY).to_string(),
            requester_name: non_blank(&self.requester_name)
                .unwrap_or(DEFAULT_REQUESTER)
                .to_string(),
            hospital_name: non_blank(&self.hospital_name).unwrap_or_default().to_string(),
        }
    }

    /// Render the broadcast, stamping the data map with `now`
    pub fn render(&self, now: OffsetDateTime) -> Result<MessageContent, NotificationError> {
        self.validate()?;
        let details = self.details();

        let title = format!("🩸 Urgent: {} Blood Needed!", details.blood_type);
        let mut body = format!(
            "{} needs {} blood in {}",
            details.requester_name, details.blood_type, details.location
        );
        if !details.hospital_name.is_empty() {
            body.push_str(" at ");
            body.push_str(&details.hospital_name);
        }

        let mut data = MessageData::new();
        data.insert("type".into(), "blood_request".into());
        data.insert("bloodType".into(), details.blood_type);
        data.insert("location".into(), details.location);
        data.insert("urgency".into(), details.urgency);
        data.insert("requesterName".into(), details.requester_name);
        data.insert("hospitalName".into(), details.hospital_name);
        data.insert("timestamp".into(), unix_timestamp(now));

        MessageContent::new(title, body, data)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Unix seconds with microsecond fraction
fn unix_timestamp(now: OffsetDateTime) -> String {
    format!("{}.{:06}", now.unix_timestamp(), now.microsecond())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_category_topic() {
        assert_eq!(category_topic("A+"), "category_apos");
        assert_eq!(category_topic("O-"), "category_oneg");
        assert_eq!(category_topic("AB+"), "category_abpos");
        assert_eq!(category_topic("b-"), "category_bneg");
    }

    #[test]
    fn test_render_with_defaults() {
        let request = BloodRequest::new("O-", "Springfield");
        let content = request
            .render(datetime!(2024-05-01 10:00:00.25 UTC))
            .unwrap();

        assert_eq!(content.title, "🩸 Urgent: O- Blood Needed!");
        assert_eq!(content.body, "Someone needs O- blood in Springfield");
        assert_eq!(content.data["urgency"], "normal");
        assert_eq!(content.data["requesterName"], "Someone");
        assert_eq!(content.data["hospitalName"], "");
        assert_eq!(content.data["type"], "blood_request");
        assert_eq!(content.data["timestamp"], "1714557600.250000");
    }

    #[test]
    fn test_render_with_hospital() {
        let request = BloodRequest {
            requester_name: Some("Dana".into()),
            hospital_name: Some("St. Mary".into()),
            urgency: Some("critical".into()),
            ..BloodRequest::new("A+", "Shelbyville")
        };
        let content = request.render(OffsetDateTime::now_utc()).unwrap();

        assert_eq!(content.body, "Dana needs A+ blood in Shelbyville at St. Mary");
        assert_eq!(content.data["urgency"], "critical");
        assert_eq!(request.topic(), "category_apos");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = BloodRequest::new("", "Springfield")
            .render(OffsetDateTime::now_utc())
            .unwrap_err();
        assert_eq!(err.to_string(), "bloodType and location are required");

        assert!(BloodRequest::new("A+", "  ").validate().is_err());
    }
}
