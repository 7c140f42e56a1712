//! Topic to wire address encoding

use crate::TOPIC_ADDRESS_PREFIX;

/// Encode an application topic as an AMQP address.
///
/// Only `&` is escaped (as `%26`); `/` and everything else pass through.
pub fn encode_topic(topic: &str) -> String {
    let mut address = String::with_capacity(TOPIC_ADDRESS_PREFIX.len() + topic.len());
    address.push_str(TOPIC_ADDRESS_PREFIX);
    for c in topic.chars() {
        if c == '&' {
            address.push_str("%26");
        } else {
            address.push(c);
        }
    }
    address
}

/// Name of the receiving link for a subscription.
///
/// Private subscriptions are `private:<pattern>`, shared ones
/// `share:<share>:<pattern>`; a share name therefore cannot hold a colon.
pub fn subscription_address(topic_pattern: &str, share: Option<&str>) -> String {
    match share {
        Some(share) => format!("share:{}:{}", share, topic_pattern),
        None => format!("private:{}", topic_pattern),
    }
}
