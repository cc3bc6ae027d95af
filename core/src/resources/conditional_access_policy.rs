//! `m365_conditional_access_policy`: Entra ID conditional access policies.
//!
//! The nested blocks (`conditions`, `grant_controls`, `session_controls`)
//! are exposed as separate schema/mapping pairs because conditional access
//! templates describe their suggested policy with the same shapes.

use crate::error::SchemaError;
use crate::mapping::{FieldMapping, Transform};
use crate::resource::{DataSourceDefinition, ResourceDefinition};
use crate::schema::{AttributeSchema, Cardinality, ObjectSchema};

pub const TYPE_NAME: &str = "m365_conditional_access_policy";
pub const COLLECTION: &str = "identity/conditionalAccess/policies";

pub const POLICY_STATES: &[&str] = &["enabled", "disabled", "enabledForReportingButNotEnforced"];

pub const CLIENT_APP_TYPES: &[&str] = &[
    "all",
    "browser",
    "mobileAppsAndDesktopClients",
    "exchangeActiveSync",
    "easSupported",
    "other",
];

pub const RISK_LEVELS: &[&str] = &["low", "medium", "high", "hidden", "none", "unknownFutureValue"];

pub const PLATFORMS: &[&str] = &[
    "android",
    "iOS",
    "windows",
    "windowsPhone",
    "macOS",
    "linux",
    "all",
    "unknownFutureValue",
];

pub const TRANSFER_METHODS: &[&str] = &[
    "none",
    "deviceCodeFlow",
    "authenticationTransfer",
    "unknownFutureValue",
];

pub const GRANT_OPERATORS: &[&str] = &["AND", "OR"];

pub const BUILT_IN_CONTROLS: &[&str] = &[
    "block",
    "mfa",
    "compliantDevice",
    "domainJoinedDevice",
    "approvedApplication",
    "compliantApplication",
    "passwordChange",
    "unknownFutureValue",
];

pub const CLOUD_APP_SECURITY_TYPES: &[&str] = &["mcasConfigured", "monitorOnly", "blockDownloads", "unknownFutureValue"];

pub const PERSISTENT_BROWSER_MODES: &[&str] = &["always", "never"];

pub const FREQUENCY_TYPES: &[&str] = &["days", "hours"];

pub const FREQUENCY_AUTHENTICATION_TYPES: &[&str] = &[
    "primaryAndSecondaryAuthentication",
    "secondaryAuthentication",
    "unknownFutureValue",
];

pub const FREQUENCY_INTERVALS: &[&str] = &["timeBased", "everyTime", "unknownFutureValue"];

pub fn schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::string("id", Computed),
        AttributeSchema::string("display_name", Required),
        AttributeSchema::string("state", Required),
        AttributeSchema::string("template_id", Computed),
        AttributeSchema::string("created_date_time", Computed),
        AttributeSchema::string("modified_date_time", Computed),
        AttributeSchema::object("conditions", Required, conditions_schema()),
        AttributeSchema::object("grant_controls", Optional, grant_controls_schema()),
        AttributeSchema::object("session_controls", Optional, session_controls_schema()),
    ])
}

pub fn mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("id", "id"),
        FieldMapping::new("display_name", "displayName"),
        FieldMapping::new("state", "state").transform(Transform::Enum(POLICY_STATES)),
        FieldMapping::new("template_id", "templateId"),
        FieldMapping::new("created_date_time", "createdDateTime").transform(Transform::Timestamp),
        FieldMapping::new("modified_date_time", "modifiedDateTime").transform(Transform::Timestamp),
        FieldMapping::object("conditions", "conditions", conditions_mappings()),
        FieldMapping::object("grant_controls", "grantControls", grant_controls_mappings()),
        FieldMapping::object("session_controls", "sessionControls", session_controls_mappings()),
    ]
}

pub fn conditions_schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::string_set("client_app_types", Required),
        AttributeSchema::string_set("user_risk_levels", Optional),
        AttributeSchema::string_set("sign_in_risk_levels", Optional),
        AttributeSchema::string_set("service_principal_risk_levels", Optional),
        AttributeSchema::object(
            "users",
            Required,
            ObjectSchema::new(vec![
                AttributeSchema::string_set("include_users", Optional),
                AttributeSchema::string_set("exclude_users", Optional),
                AttributeSchema::string_set("include_groups", Optional),
                AttributeSchema::string_set("exclude_groups", Optional),
                AttributeSchema::string_set("include_roles", Optional),
                AttributeSchema::string_set("exclude_roles", Optional),
            ]),
        ),
        AttributeSchema::object(
            "applications",
            Required,
            ObjectSchema::new(vec![
                AttributeSchema::string_set("include_applications", Optional),
                AttributeSchema::string_set("exclude_applications", Optional),
                AttributeSchema::string_set("include_user_actions", Optional),
                AttributeSchema::string_set("include_authentication_context_class_references", Optional),
            ]),
        ),
        AttributeSchema::object(
            "platforms",
            Optional,
            ObjectSchema::new(vec![
                AttributeSchema::string_set("include_platforms", Optional),
                AttributeSchema::string_set("exclude_platforms", Optional),
            ]),
        ),
        AttributeSchema::object(
            "locations",
            Optional,
            ObjectSchema::new(vec![
                AttributeSchema::string_set("include_locations", Optional),
                AttributeSchema::string_set("exclude_locations", Optional),
            ]),
        ),
        AttributeSchema::object(
            "authentication_flows",
            Optional,
            ObjectSchema::new(vec![AttributeSchema::string_set("transfer_methods", Optional)]),
        ),
    ])
}

pub fn conditions_mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("client_app_types", "clientAppTypes").transform(Transform::Enum(CLIENT_APP_TYPES)),
        FieldMapping::new("user_risk_levels", "userRiskLevels").transform(Transform::Enum(RISK_LEVELS)),
        FieldMapping::new("sign_in_risk_levels", "signInRiskLevels").transform(Transform::Enum(RISK_LEVELS)),
        FieldMapping::new("service_principal_risk_levels", "servicePrincipalRiskLevels")
            .transform(Transform::Enum(RISK_LEVELS)),
        FieldMapping::object(
            "users",
            "users",
            vec![
                FieldMapping::new("include_users", "includeUsers"),
                FieldMapping::new("exclude_users", "excludeUsers"),
                FieldMapping::new("include_groups", "includeGroups"),
                FieldMapping::new("exclude_groups", "excludeGroups"),
                FieldMapping::new("include_roles", "includeRoles"),
                FieldMapping::new("exclude_roles", "excludeRoles"),
            ],
        ),
        FieldMapping::object(
            "applications",
            "applications",
            vec![
                FieldMapping::new("include_applications", "includeApplications"),
                FieldMapping::new("exclude_applications", "excludeApplications"),
                FieldMapping::new("include_user_actions", "includeUserActions"),
                FieldMapping::new(
                    "include_authentication_context_class_references",
                    "includeAuthenticationContextClassReferences",
                ),
            ],
        ),
        FieldMapping::object(
            "platforms",
            "platforms",
            vec![
                FieldMapping::new("include_platforms", "includePlatforms").transform(Transform::Enum(PLATFORMS)),
                FieldMapping::new("exclude_platforms", "excludePlatforms").transform(Transform::Enum(PLATFORMS)),
            ],
        ),
        FieldMapping::object(
            "locations",
            "locations",
            vec![
                FieldMapping::new("include_locations", "includeLocations"),
                FieldMapping::new("exclude_locations", "excludeLocations"),
            ],
        ),
        FieldMapping::object(
            "authentication_flows",
            "authenticationFlows",
            vec![FieldMapping::new("transfer_methods", "transferMethods")
                .transform(Transform::Flags(TRANSFER_METHODS))],
        ),
    ]
}

pub fn grant_controls_schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::string("operator", Required),
        AttributeSchema::string_set("built_in_controls", Optional),
        AttributeSchema::string_set("custom_authentication_factors", Optional),
        AttributeSchema::string_set("terms_of_use", Optional),
        AttributeSchema::string("authentication_strength_id", Optional),
    ])
}

pub fn grant_controls_mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("operator", "operator").transform(Transform::Enum(GRANT_OPERATORS)),
        FieldMapping::new("built_in_controls", "builtInControls").transform(Transform::Enum(BUILT_IN_CONTROLS)),
        FieldMapping::new("custom_authentication_factors", "customAuthenticationFactors"),
        FieldMapping::new("terms_of_use", "termsOfUse"),
        FieldMapping::new("authentication_strength_id", "authenticationStrength.id"),
    ]
}

pub fn session_controls_schema() -> ObjectSchema {
    use Cardinality::*;
    ObjectSchema::new(vec![
        AttributeSchema::bool("disable_resilience_defaults", Optional),
        AttributeSchema::bool("application_enforced_restrictions_enabled", Optional),
        AttributeSchema::object(
            "cloud_app_security",
            Optional,
            ObjectSchema::new(vec![
                AttributeSchema::bool("is_enabled", Optional),
                AttributeSchema::string("cloud_app_security_type", Optional),
            ]),
        ),
        AttributeSchema::object(
            "persistent_browser",
            Optional,
            ObjectSchema::new(vec![
                AttributeSchema::bool("is_enabled", Optional),
                AttributeSchema::string("mode", Optional),
            ]),
        ),
        AttributeSchema::object(
            "sign_in_frequency",
            Optional,
            ObjectSchema::new(vec![
                AttributeSchema::bool("is_enabled", Optional),
                AttributeSchema::string("type", Optional),
                AttributeSchema::int64("value", Optional),
                AttributeSchema::string("authentication_type", Optional),
                AttributeSchema::string("frequency_interval", Optional),
            ]),
        ),
    ])
}

pub fn session_controls_mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("disable_resilience_defaults", "disableResilienceDefaults"),
        FieldMapping::new(
            "application_enforced_restrictions_enabled",
            "applicationEnforcedRestrictions.isEnabled",
        ),
        FieldMapping::object(
            "cloud_app_security",
            "cloudAppSecurity",
            vec![
                FieldMapping::new("is_enabled", "isEnabled"),
                FieldMapping::new("cloud_app_security_type", "cloudAppSecurityType")
                    .transform(Transform::Enum(CLOUD_APP_SECURITY_TYPES)),
            ],
        ),
        FieldMapping::object(
            "persistent_browser",
            "persistentBrowser",
            vec![
                FieldMapping::new("is_enabled", "isEnabled"),
                FieldMapping::new("mode", "mode").transform(Transform::Enum(PERSISTENT_BROWSER_MODES)),
            ],
        ),
        FieldMapping::object(
            "sign_in_frequency",
            "signInFrequency",
            vec![
                FieldMapping::new("is_enabled", "isEnabled"),
                FieldMapping::new("type", "type").transform(Transform::Enum(FREQUENCY_TYPES)),
                FieldMapping::new("value", "value"),
                FieldMapping::new("authentication_type", "authenticationType")
                    .transform(Transform::Enum(FREQUENCY_AUTHENTICATION_TYPES)),
                FieldMapping::new("frequency_interval", "frequencyInterval")
                    .transform(Transform::Enum(FREQUENCY_INTERVALS)),
            ],
        ),
    ]
}

pub fn resource() -> Result<ResourceDefinition, SchemaError> {
    ResourceDefinition::new(
        TYPE_NAME,
        "conditional access policy",
        COLLECTION,
        schema(),
        mappings(),
        "displayName",
    )
}

/// Look a policy up by `id` or `display_name`.
pub fn data_source() -> Result<DataSourceDefinition, SchemaError> {
    resource()?.data_source(TYPE_NAME, "id", "display_name")
}
