//! Resource and data source lifecycles over a `Transport`.
//!
//! # Design
//! A `ResourceDefinition` pairs a Graph collection with its schema and the
//! mapping table bound to that schema. `ResourceClient` drives the
//! create/read/update/delete/import lifecycle for one definition:
//!
//! - `create` and `update` build the request body before any network call,
//!   so a construction error never leaves a half-applied write behind.
//! - After a successful write, the object is read back through the
//!   consistency guard, using `drift` against the plan as the convergence
//!   predicate.
//! - `read` returns `None` for a 404 so the caller can drop an object that
//!   was deleted out of band; `delete` treats a 404 as already done.
//!
//! `DataSource` fetches every page of the collection, resolves the query
//! against that snapshot and maps the match through its table.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::client::GraphClient;
use crate::config::ProviderConfig;
use crate::construct::construct;
use crate::error::{QueryKind, ReconcileError, ReconcileResult, SchemaError};
use crate::guard::{guarded_read, GuardContext, RetryPolicy, WriteKind};
use crate::http::Transport;
use crate::mapping::{FieldMapping, MappingTable};
use crate::model::LocalObject;
use crate::resolve::{resolve, Candidate, ResolutionQuery};
use crate::schema::ObjectSchema;
use crate::state::{drift, map_to_local};

/// A manageable Graph object type.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    /// Type name exposed to the configuration tool, e.g. `m365_conditional_access_policy`.
    pub type_name: &'static str,
    /// Human-readable noun used in logs and diagnostics.
    pub label: &'static str,
    /// Collection path relative to the versioned service root.
    pub collection: &'static str,
    pub schema: ObjectSchema,
    pub table: MappingTable,
    /// Wire property holding the object's display name.
    pub name_key: &'static str,
    mappings: Vec<FieldMapping>,
}

impl ResourceDefinition {
    pub fn new(
        type_name: &'static str,
        label: &'static str,
        collection: &'static str,
        schema: ObjectSchema,
        mappings: Vec<FieldMapping>,
        name_key: &'static str,
    ) -> Result<Self, SchemaError> {
        let table = MappingTable::bind(&schema, &mappings)?;
        Ok(Self {
            type_name,
            label,
            collection,
            schema,
            table,
            name_key,
            mappings,
        })
    }

    /// Derive the read-only data source that looks this resource up by
    /// `id_attr` or `name_attr`.
    pub fn data_source(
        &self,
        type_name: &'static str,
        id_attr: &'static str,
        name_attr: &'static str,
    ) -> Result<DataSourceDefinition, SchemaError> {
        DataSourceDefinition::new(
            type_name,
            self.label,
            self.collection,
            self.schema.for_data_source(&[id_attr, name_attr]),
            &self.mappings,
            id_attr,
            name_attr,
            self.name_key,
        )
    }
}

/// A read-only lookup into a Graph collection.
#[derive(Debug, Clone)]
pub struct DataSourceDefinition {
    pub type_name: &'static str,
    pub label: &'static str,
    pub collection: &'static str,
    pub schema: ObjectSchema,
    pub table: MappingTable,
    /// Local attribute addressing the object by id.
    pub id_attr: &'static str,
    /// Local attribute addressing the object by name.
    pub name_attr: &'static str,
    /// Wire property the name query is matched against.
    pub name_key: &'static str,
}

impl DataSourceDefinition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        type_name: &'static str,
        label: &'static str,
        collection: &'static str,
        schema: ObjectSchema,
        mappings: &[FieldMapping],
        id_attr: &'static str,
        name_attr: &'static str,
        name_key: &'static str,
    ) -> Result<Self, SchemaError> {
        let table = MappingTable::bind(&schema, mappings)?;
        for attr in [id_attr, name_attr] {
            if schema.attribute(attr).is_none() {
                return Err(SchemaError::UnknownAttribute(attr.to_string()));
            }
        }
        Ok(Self {
            type_name,
            label,
            collection,
            schema,
            table,
            id_attr,
            name_attr,
            name_key,
        })
    }
}

/// Lifecycle operations for one resource type.
pub struct ResourceClient<T> {
    definition: ResourceDefinition,
    graph: GraphClient,
    transport: T,
    create_policy: RetryPolicy,
    update_policy: RetryPolicy,
}

impl<T: Transport> ResourceClient<T> {
    pub fn new(definition: ResourceDefinition, graph: GraphClient, transport: T) -> Self {
        Self {
            definition,
            graph,
            transport,
            create_policy: RetryPolicy::for_create(),
            update_policy: RetryPolicy::for_update(),
        }
    }

    pub fn from_config(
        definition: ResourceDefinition,
        config: &ProviderConfig,
        transport: T,
    ) -> ReconcileResult<Self> {
        Ok(Self::new(definition, GraphClient::new(&config.base_url()), transport).with_policies(
            config.create_retry.to_policy()?,
            config.update_retry.to_policy()?,
        ))
    }

    pub fn with_policies(mut self, create: RetryPolicy, update: RetryPolicy) -> Self {
        self.create_policy = create;
        self.update_policy = update;
        self
    }

    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    /// Create the object described by `plan` and return its confirmed state.
    #[instrument(skip_all, fields(resource = self.definition.type_name))]
    pub async fn create(&self, plan: &LocalObject, ctx: &GuardContext) -> ReconcileResult<LocalObject> {
        let body = construct(plan, &self.definition.table)?;
        let request = self.graph.build_create(self.definition.collection, &body)?;
        let response = ctx.run(self.transport.execute(request), 0).await??;
        let created = self.graph.parse_create(response)?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ReconcileError::Deserialization("create response carries no `id`".to_string()))?
            .to_string();
        info!(id = %id, "created");

        self.confirm(&id, plan, WriteKind::Create, &self.create_policy, ctx).await
    }

    /// Current state of `id`, or `None` when it no longer exists.
    #[instrument(skip_all, fields(resource = self.definition.type_name, id = %id))]
    pub async fn read(&self, id: &str, ctx: &GuardContext) -> ReconcileResult<Option<LocalObject>> {
        match ctx.run(self.fetch(id), 0).await? {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found() => {
                warn!("object no longer exists, dropping it from state");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `plan` to `id` and return the confirmed state.
    #[instrument(skip_all, fields(resource = self.definition.type_name, id = %id))]
    pub async fn update(
        &self,
        id: &str,
        plan: &LocalObject,
        ctx: &GuardContext,
    ) -> ReconcileResult<LocalObject> {
        let body = construct(plan, &self.definition.table)?;
        let request = self.graph.build_update(self.definition.collection, id, &body)?;
        let response = ctx.run(self.transport.execute(request), 0).await??;
        self.graph.parse_update(response)?;
        info!("updated");

        self.confirm(id, plan, WriteKind::Update, &self.update_policy, ctx).await
    }

    #[instrument(skip_all, fields(resource = self.definition.type_name, id = %id))]
    pub async fn delete(&self, id: &str, ctx: &GuardContext) -> ReconcileResult<()> {
        let request = self.graph.build_delete(self.definition.collection, id);
        let response = ctx.run(self.transport.execute(request), 0).await??;
        match self.graph.parse_delete(response) {
            Ok(()) => {
                info!("deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("object was already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adopt an existing object by id.
    ///
    /// A missing id fails with `NotFound` listing the ids that do exist.
    #[instrument(skip_all, fields(resource = self.definition.type_name, id = %id))]
    pub async fn import(&self, id: &str, ctx: &GuardContext) -> ReconcileResult<LocalObject> {
        match ctx.run(self.fetch(id), 0).await? {
            Ok(state) => return Ok(state),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let documents = list_collection(&self.transport, &self.graph, self.definition.collection, ctx).await?;
        let candidates = documents
            .into_iter()
            .map(|doc| Candidate::from_document(doc, self.definition.name_key))
            .collect::<ReconcileResult<Vec<_>>>()?;
        match resolve(self.definition.label, &ResolutionQuery::ById(id.to_string()), &candidates) {
            Ok(found) => map_to_local(&found.document, &self.definition.table),
            Err(ReconcileError::NoCandidates { resource }) => Err(ReconcileError::NotFound {
                resource,
                kind: QueryKind::Id,
                input: id.to_string(),
                suggestions: Vec::new(),
                valid: Vec::new(),
                attribute: None,
            }),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, id: &str) -> ReconcileResult<LocalObject> {
        let request = self.graph.build_get(self.definition.collection, id);
        let response = self.transport.execute(request).await?;
        let document = self.graph.parse_get(response)?;
        map_to_local(&document, &self.definition.table)
    }

    async fn confirm(
        &self,
        id: &str,
        plan: &LocalObject,
        write: WriteKind,
        policy: &RetryPolicy,
        ctx: &GuardContext,
    ) -> ReconcileResult<LocalObject> {
        let table = &self.definition.table;
        guarded_read(
            self.definition.label,
            policy,
            write,
            ctx,
            move || self.fetch(id),
            |observed: &LocalObject| {
                let fields = drift(plan, observed, table);
                if fields.is_empty() {
                    Ok(())
                } else {
                    Err(ReconcileError::Stale { fields })
                }
            },
        )
        .await
    }
}

/// Read-only lookups for one data source type.
pub struct DataSource<T> {
    definition: DataSourceDefinition,
    graph: GraphClient,
    transport: T,
}

impl<T: Transport> DataSource<T> {
    pub fn new(definition: DataSourceDefinition, graph: GraphClient, transport: T) -> Self {
        Self {
            definition,
            graph,
            transport,
        }
    }

    pub fn definition(&self) -> &DataSourceDefinition {
        &self.definition
    }

    /// Resolve the lookup in `config` and return the matching object.
    #[instrument(skip_all, fields(data_source = self.definition.type_name))]
    pub async fn read(&self, config: &LocalObject, ctx: &GuardContext) -> ReconcileResult<LocalObject> {
        let def = &self.definition;
        let query = ResolutionQuery::from_config(config, def.id_attr, def.name_attr)?;
        let documents = list_collection(&self.transport, &self.graph, def.collection, ctx).await?;
        let candidates = documents
            .into_iter()
            .map(|doc| Candidate::from_document(doc, def.name_key))
            .collect::<ReconcileResult<Vec<_>>>()?;
        debug!(candidates = candidates.len(), kind = query.kind().label(), "resolving");

        let found = match resolve(def.label, &query, &candidates) {
            Ok(found) => found,
            Err(mut err) => {
                if let ReconcileError::NotFound { kind, attribute, .. } = &mut err {
                    let lookup = match kind {
                        QueryKind::Id => def.id_attr,
                        QueryKind::Name => def.name_attr,
                    };
                    *attribute = Some(lookup.to_string());
                }
                return Err(err);
            }
        };
        map_to_local(&found.document, &def.table)
    }
}

/// Fetch every page of `collection`, following `@odata.nextLink`.
pub async fn list_collection<T: Transport>(
    transport: &T,
    graph: &GraphClient,
    collection: &str,
    ctx: &GuardContext,
) -> ReconcileResult<Vec<Value>> {
    let mut documents = Vec::new();
    let mut request = graph.build_list(collection);
    let mut pages = 0u32;
    loop {
        let response = ctx.run(transport.execute(request), 0).await??;
        let page = graph.parse_list(response)?;
        pages += 1;
        documents.extend(page.value);
        match page.next_link {
            Some(link) => request = graph.build_next_page(&link),
            None => break,
        }
    }
    debug!(collection, pages, documents = documents.len(), "listed collection");
    Ok(documents)
}
