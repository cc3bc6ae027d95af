//! Resource and data source definitions shipped by the provider.

pub mod conditional_access_policy;
pub mod conditional_access_template;
pub mod resource_operation;

use crate::error::SchemaError;
use crate::resource::{DataSourceDefinition, ResourceDefinition};

/// Every managed resource type, bound and validated.
pub fn resources() -> Result<Vec<ResourceDefinition>, SchemaError> {
    Ok(vec![
        conditional_access_policy::resource()?,
        resource_operation::resource()?,
    ])
}

/// Every data source type, bound and validated.
pub fn data_sources() -> Result<Vec<DataSourceDefinition>, SchemaError> {
    Ok(vec![
        conditional_access_policy::data_source()?,
        conditional_access_template::data_source()?,
    ])
}
