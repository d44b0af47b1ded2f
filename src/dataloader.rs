//! Request-scoped batching for `@grpc__fetch(dataloader: ...)` fields
//!
//! All resolutions of a batched field within one request register their keys
//! under a shared loader keyed by the field's response type name. After a
//! short coalescing window the loader issues a single RPC carrying the
//! accumulated key set in the directive's `listArgument` request field, then
//! splits the response back to the individual callers either by the
//! `responseKey` correlation field or positionally.

use crate::descriptor::{ProtoService, RequestContext};
use crate::directives::FetchDirective;
use crate::error::Error;
use crate::value::{self, NormalizedValue};
use async_graphql::dataloader::{DataLoader, Loader};
use async_graphql::indexmap::IndexMap;
use async_graphql::{Name, Value as ConstValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Coalescing window before a pending batch is flushed
const BATCH_DELAY: Duration = Duration::from_millis(1);

/// One pending-batch executor: a fetch directive bound to its service and the
/// request context whose metadata rules apply to the outgoing call
pub struct BatchLoader {
    service: Arc<ProtoService>,
    fetch: FetchDirective,
    ctx: RequestContext,
}

impl BatchLoader {
    pub fn new(service: Arc<ProtoService>, fetch: FetchDirective, ctx: RequestContext) -> Self {
        Self {
            service,
            fetch,
            ctx,
        }
    }
}

impl Loader<NormalizedValue> for BatchLoader {
    type Value = ConstValue;
    type Error = Arc<Error>;

    async fn load(
        &self,
        keys: &[NormalizedValue],
    ) -> Result<HashMap<NormalizedValue, ConstValue>, Arc<Error>> {
        let params = self.fetch.dataloader.as_ref().ok_or_else(|| {
            Arc::new(Error::Internal(
                "batch loader built without dataloader parameters".to_string(),
            ))
        })?;
        let rpc = self.service.rpc(&self.fetch.rpc).ok_or_else(|| {
            Arc::new(Error::Schema(format!(
                "no rpc named {} on service {}",
                self.fetch.rpc, self.service.service_name
            )))
        })?;

        debug!(rpc = %self.fetch.rpc, keys = keys.len(), "flushing batch");

        let mut entries = IndexMap::new();
        entries.insert(
            Name::new(&params.list_argument),
            ConstValue::List(keys.iter().map(|k| k.value().clone()).collect()),
        );
        let request = value::build_message(&rpc.input(), &entries).map_err(Arc::new)?;

        let response = self
            .service
            .invoke(&self.fetch.rpc, request, &self.ctx)
            .await
            .map_err(Arc::new)?;

        let mut result = value::message_to_value(&response);
        if let Some(dig) = &self.fetch.dig {
            result = value::dig_value(&result, dig).unwrap_or(ConstValue::Null);
        }
        let items = match result {
            ConstValue::List(items) => items,
            ConstValue::Null => Vec::new(),
            other => vec![other],
        };

        let mut out = HashMap::new();
        match &params.response_key {
            Some(response_key) => {
                for item in items {
                    let correlated = match &item {
                        ConstValue::Object(obj) => obj.get(response_key.as_str()).cloned(),
                        _ => None,
                    };
                    if let Some(key_value) = correlated {
                        out.insert(NormalizedValue::new(key_value), item);
                    }
                }
            }
            None => {
                // positional split: the service must return one item per key,
                // in key order
                for (key, item) in keys.iter().zip(items) {
                    out.insert(key.clone(), item);
                }
            }
        }
        Ok(out)
    }
}

/// Per-request registry of batch loaders, keyed by response type name so all
/// resolutions of the same type share one batch. Owned by the request's
/// execution context and discarded at request end.
#[derive(Default)]
pub struct BatchDispatcher {
    loaders: Mutex<HashMap<String, Arc<DataLoader<BatchLoader>>>>,
}

impl BatchDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The loader for a response type, creating it on first use
    pub fn loader(
        &self,
        response_type: &str,
        make: impl FnOnce() -> BatchLoader,
    ) -> Arc<DataLoader<BatchLoader>> {
        self.loaders
            .lock()
            .entry(response_type.to_string())
            .or_insert_with(|| Arc::new(DataLoader::new(make(), tokio::spawn).delay(BATCH_DELAY)))
            .clone()
    }
}
