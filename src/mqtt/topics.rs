//! Topic construction and regional broker selection for the security
//! channel.

pub const SECURITY_TOPIC_PREFIX: &str = "cmd/eufy_security";
pub const RESPONSE_SUFFIX: &str = "/res";

pub const PRIMARY_BROKER_HOST: &str = "security-mqtt.eufylife.com";
pub const EU_BROKER_HOST: &str = "security-mqtt-eu.eufylife.com";
pub const SECURITY_BROKER_PORT: u16 = 8883;

/// Host segment of the caller-supplied API base that selects the EU
/// broker. The segment form (`security-app-eu.eufylife.com`) cannot match
/// the `.eu` run inside the vendor domain itself.
const EU_API_MARKER: &str = "-eu.";

const CLIENT_ID_PREFIX: &str = "android_";

/// Request-direction topic for one lock.
pub fn request_topic(model: &str, serial: &str) -> String {
    format!("{SECURITY_TOPIC_PREFIX}/{model}/{serial}/req")
}

/// Response-direction topic for one lock.
pub fn response_topic(model: &str, serial: &str) -> String {
    format!("{SECURITY_TOPIC_PREFIX}/{model}/{serial}/res")
}

/// Only response-direction messages are routed; request echoes are not.
pub fn is_response_topic(topic: &str) -> bool {
    topic.ends_with(RESPONSE_SUFFIX)
}

/// Map the caller's regional API base to a broker host. Unknown bases fall
/// back to the primary broker.
pub fn broker_host(api_base: &str) -> &'static str {
    if api_base.contains(EU_API_MARKER) {
        EU_BROKER_HOST
    } else {
        PRIMARY_BROKER_HOST
    }
}

/// Deterministic broker client id: fixed prefix, user-center id, then the
/// device id concatenated with the punctuation-stripped broker host.
pub fn broker_client_id(user_center_id: &str, openudid: &str, host: &str) -> String {
    let stripped: String = host.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("{CLIENT_ID_PREFIX}{user_center_id}{openudid}{stripped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_shapes() {
        assert_eq!(
            request_topic("T85D0", "SN123"),
            "cmd/eufy_security/T85D0/SN123/req"
        );
        assert_eq!(
            response_topic("T85D0", "SN123"),
            "cmd/eufy_security/T85D0/SN123/res"
        );
    }

    #[test]
    fn response_direction_filter() {
        assert!(is_response_topic("cmd/eufy_security/T85D0/SN123/res"));
        assert!(!is_response_topic("cmd/eufy_security/T85D0/SN123/req"));
    }

    #[test]
    fn eu_marker_selects_eu_broker() {
        assert_eq!(
            broker_host("https://security-app-eu.eufylife.com/v1"),
            EU_BROKER_HOST
        );
        assert_eq!(broker_host(""), PRIMARY_BROKER_HOST);
    }

    #[test]
    fn vendor_domain_is_not_mistaken_for_the_eu_marker() {
        // ".eufylife.com" contains the letters "eu"; only the dedicated
        // "-eu." host segment may select the EU broker.
        assert_eq!(
            broker_host("https://security-app.eufylife.com/v1"),
            PRIMARY_BROKER_HOST
        );
        assert_eq!(
            broker_host("https://api.eufylife.com"),
            PRIMARY_BROKER_HOST
        );
    }

    #[test]
    fn client_id_strips_host_punctuation() {
        let id = broker_client_id("uc1", "dev42", "security-mqtt.eufylife.com");
        assert_eq!(id, "android_uc1dev42securitymqtteufylifecom");
    }
}
