//! `m365_resource_operation`: Intune RBAC resource operations.

use crate::error::SchemaError;
use crate::mapping::FieldMapping;
use crate::resource::ResourceDefinition;
use crate::schema::{AttributeSchema, Cardinality, ObjectSchema};

pub const TYPE_NAME: &str = "m365_resource_operation";
pub const COLLECTION: &str = "deviceManagement/resourceOperations";

pub fn schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::string("id", Computed),
        AttributeSchema::string("resource_name", Required),
        AttributeSchema::string("action_name", Required),
        AttributeSchema::string("description", Optional),
        AttributeSchema::bool("enabled_for_scope_validation", Computed),
    ])
}

pub fn mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("id", "id"),
        FieldMapping::new("resource_name", "resourceName"),
        FieldMapping::new("action_name", "actionName"),
        FieldMapping::new("description", "description"),
        FieldMapping::new("enabled_for_scope_validation", "enabledForScopeValidation"),
    ]
}

pub fn resource() -> Result<ResourceDefinition, SchemaError> {
    ResourceDefinition::new(
        TYPE_NAME,
        "resource operation",
        COLLECTION,
        schema(),
        mappings(),
        "resourceName",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::construct;
    use crate::model::{Attr, LocalObject};
    use serde_json::json;

    #[test]
    fn computed_fields_are_never_sent() {
        let plan = LocalObject::new()
            .with("id", Attr::Unknown)
            .with("resource_name", Attr::string("Audit Data"))
            .with("action_name", Attr::string("Read"))
            .with("description", Attr::Unset)
            .with("enabled_for_scope_validation", Attr::bool(true));
        let body = construct(&plan, &resource().unwrap().table).unwrap();
        assert_eq!(body, json!({ "resourceName": "Audit Data", "actionName": "Read" }));
    }
}
