//! Built-in conditional access template catalogue.

use serde_json::{json, Value};

const GLOBAL_ADMINISTRATOR: &str = "62e90394-69f5-4237-9190-012177145e10";
const SECURITY_ADMINISTRATOR: &str = "194ae4cb-b126-40b2-bd5b-6091b380977d";
const EXCHANGE_ADMINISTRATOR: &str = "29232cdf-9323-42fd-ade2-1d097af3e4de";
const AZURE_MANAGEMENT: &str = "797f4846-ba00-4fd7-ba43-dac1f8f63013";

fn admin_roles() -> Value {
    json!([GLOBAL_ADMINISTRATOR, SECURITY_ADMINISTRATOR, EXCHANGE_ADMINISTRATOR])
}

pub(crate) fn catalogue() -> Vec<Value> {
    vec![
        json!({
            "id": "c7503427-338e-4c5e-902d-abe252abfde4",
            "name": "Require multifactor authentication for admins",
            "description": "Require multifactor authentication for privileged administrative accounts to reduce risk of compromise.",
            "scenarios": "secureFoundation,zeroTrust,protectAdmins",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": {
                        "includeRoles": admin_roles(),
                        "excludeUsers": ["Current administrator will be excluded"]
                    },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            }
        }),
        json!({
            "id": "b8bda7f8-6584-4446-bce9-d871480e53fa",
            "name": "Securing security info registration",
            "description": "Secure when and how users register for Microsoft Entra multifactor authentication and self-service password reset.",
            "scenarios": "secureFoundation,zeroTrust,remoteWork",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": {
                        "includeUsers": ["All"],
                        "excludeUsers": ["GuestsOrExternalUsers"],
                        "excludeRoles": [GLOBAL_ADMINISTRATOR]
                    },
                    "applications": { "includeUserActions": ["urn:user:registersecurityinfo"] },
                    "locations": { "includeLocations": ["All"], "excludeLocations": ["AllTrusted"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            }
        }),
        json!({
            "id": "0b2282f9-2862-4178-88b5-d79340b36cb8",
            "name": "Block legacy authentication",
            "description": "Block legacy authentication endpoints that can be used to bypass multifactor authentication.",
            "scenarios": "secureFoundation,zeroTrust,remoteWork,protectAdmins",
            "details": {
                "conditions": {
                    "clientAppTypes": ["exchangeActiveSync", "other"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": { "includeUsers": ["All"], "excludeUsers": ["Current administrator will be excluded"] },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["block"] }
            }
        }),
        json!({
            "id": "a3d0a415-b068-4326-9251-f9cdf9feeb64",
            "name": "Require multifactor authentication for all users",
            "description": "Require multifactor authentication for all user accounts to reduce risk of compromise.",
            "scenarios": "secureFoundation,zeroTrust,remoteWork",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": { "includeUsers": ["All"], "excludeUsers": ["Current administrator will be excluded"] },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            }
        }),
        json!({
            "id": "a4072ac0-722b-4991-981b-7f9755daef14",
            "name": "Require multifactor authentication for guest access",
            "description": "Require guest users perform multifactor authentication when accessing your company resources.",
            "scenarios": "zeroTrust,remoteWork",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": { "includeUsers": ["GuestsOrExternalUsers"] },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            }
        }),
        json!({
            "id": "d8c51a9a-e6b1-454d-86af-554e7872e2c1",
            "name": "Require multifactor authentication for Azure management",
            "description": "Require multifactor authentication to protect privileged access to Azure management.",
            "scenarios": "secureFoundation,zeroTrust,protectAdmins",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": [],
                    "users": { "includeUsers": ["All"], "excludeUsers": ["Current administrator will be excluded"] },
                    "applications": { "includeApplications": [AZURE_MANAGEMENT] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            }
        }),
        json!({
            "id": "6b619f55-792e-45dc-9711-d83ec9d7ae90",
            "name": "Require multifactor authentication for risky sign-ins",
            "description": "Require multifactor authentication if the sign-in risk is detected to be medium or high.",
            "scenarios": "zeroTrust,remoteWork,emergingThreats",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": [],
                    "signInRiskLevels": ["high", "medium"],
                    "users": { "includeUsers": ["All"], "excludeUsers": ["Current administrator will be excluded"] },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] },
                "sessionControls": {
                    "signInFrequency": {
                        "isEnabled": true,
                        "authenticationType": "primaryAndSecondaryAuthentication",
                        "frequencyInterval": "everyTime"
                    }
                }
            }
        }),
        json!({
            "id": "634b6de7-c38d-4357-a2c7-3842706eedd7",
            "name": "Require password change for high-risk users",
            "description": "Require the user to change their password if the user risk is detected to be high.",
            "scenarios": "zeroTrust,remoteWork",
            "details": {
                "conditions": {
                    "clientAppTypes": ["all"],
                    "userRiskLevels": ["high"],
                    "signInRiskLevels": [],
                    "users": { "includeUsers": ["All"], "excludeUsers": ["Current administrator will be excluded"] },
                    "applications": { "includeApplications": ["All"] }
                },
                "grantControls": { "operator": "AND", "builtInControls": ["mfa", "passwordChange"] },
                "sessionControls": {
                    "signInFrequency": {
                        "isEnabled": true,
                        "authenticationType": "primaryAndSecondaryAuthentication",
                        "frequencyInterval": "everyTime"
                    }
                }
            }
        }),
    ]
}
