//! `m365_conditional_access_template`: the read-only catalogue of
//! Microsoft-authored policy templates, looked up by `id` or `name`.

use crate::error::SchemaError;
use crate::mapping::{FieldMapping, Transform};
use crate::resource::DataSourceDefinition;
use crate::resources::conditional_access_policy as policy;
use crate::schema::{AttributeSchema, Cardinality, ObjectSchema};

pub const TYPE_NAME: &str = "m365_conditional_access_template";
pub const COLLECTION: &str = "identity/conditionalAccess/templates";

pub const SCENARIOS: &[&str] = &[
    "new",
    "secureFoundation",
    "zeroTrust",
    "remoteWork",
    "protectAdmins",
    "emergingThreats",
    "unknownFutureValue",
];

/// The template shape. Every attribute except the lookup keys is read-only
/// once [`data_source`] derives the data source schema from it.
pub fn schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::string("id", Computed),
        AttributeSchema::string("name", Computed),
        AttributeSchema::string("description", Computed),
        AttributeSchema::string_set("scenarios", Computed),
        AttributeSchema::object(
            "details",
            Computed,
            ObjectSchema::new(vec![
                AttributeSchema::object("conditions", Computed, policy::conditions_schema()),
                AttributeSchema::object("grant_controls", Optional, policy::grant_controls_schema()),
                AttributeSchema::object("session_controls", Optional, policy::session_controls_schema()),
            ]),
        ),
    ])
}

pub fn mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("id", "id"),
        FieldMapping::new("name", "name"),
        FieldMapping::new("description", "description"),
        FieldMapping::new("scenarios", "scenarios").transform(Transform::Flags(SCENARIOS)),
        FieldMapping::object(
            "details",
            "details",
            vec![
                FieldMapping::object("conditions", "conditions", policy::conditions_mappings()),
                FieldMapping::object("grant_controls", "grantControls", policy::grant_controls_mappings()),
                FieldMapping::object("session_controls", "sessionControls", policy::session_controls_mappings()),
            ],
        ),
    ]
}

pub fn data_source() -> Result<DataSourceDefinition, SchemaError> {
    DataSourceDefinition::new(
        TYPE_NAME,
        "conditional access template",
        COLLECTION,
        schema().for_data_source(&["id", "name"]),
        &mappings(),
        "id",
        "name",
        "name",
    )
}
