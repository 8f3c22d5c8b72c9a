use serde::Serialize;

use crate::record::ScheduledCallRecord;

const CUSTOMER_EDIT_PREFIX: &str = "/customers/phone/";

/// A client-side route change to the customer edit view. The record rides
/// along so the view can render without refetching it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationRequest {
    pub route: String,
    pub customer: ScheduledCallRecord,
}

impl NavigationRequest {
    pub fn customer_edit(customer: ScheduledCallRecord) -> Self {
        let phone = customer.phone_no.as_deref().unwrap_or_default();
        Self {
            route: format!("{CUSTOMER_EDIT_PREFIX}{phone}"),
            customer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_phone_number() {
        let customer = ScheduledCallRecord {
            phone_no: Some("9876543210".to_string()),
            ..ScheduledCallRecord::default()
        };

        let request = NavigationRequest::customer_edit(customer.clone());

        assert_eq!(request.route, "/customers/phone/9876543210");
        assert_eq!(request.customer, customer);
    }

    #[test]
    fn navigation_state_keeps_database_id() {
        let customer: ScheduledCallRecord = serde_json::from_value(serde_json::json!({
            "id": 17,
            "phone_no": "9876543210",
        }))
        .expect("decode customer");

        let state = serde_json::to_value(NavigationRequest::customer_edit(customer))
            .expect("encode navigation");

        assert_eq!(state["customer"]["id"], serde_json::json!(17));
        assert!(state["customer"].get("C_unique_id").is_none());
    }
}
