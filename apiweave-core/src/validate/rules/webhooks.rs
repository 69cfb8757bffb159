use crate::error::Violation;
use crate::types::ApiDocument;
use crate::validate::check_expression;

use super::functions::validate_function;

pub fn validate(violations: &mut Vec<Violation>, document: &ApiDocument) {
    for (name, webhook) in &document.webhooks {
        let path = format!("webhooks.{name}");

        if webhook.check_on_start && webhook.key.is_none() {
            violations.push(Violation::new(
                path.clone(),
                "checkOnStart requires a default key",
            ));
        }
        check_expression(violations, &format!("{path}.key"), webhook.key.as_deref());
        check_expression(violations, &format!("{path}.id"), webhook.id.as_deref());

        validate_function(violations, document, &format!("{path}.check"), &webhook.check, false);
        validate_function(violations, document, &format!("{path}.add"), &webhook.add, false);
        validate_function(violations, document, &format!("{path}.remove"), &webhook.remove, false);
        // The handle role processes inbound deliveries; it never issues its
        // own request, so the url requirement is relaxed.
        validate_function(violations, document, &format!("{path}.handle"), &webhook.handle, true);
    }
}
