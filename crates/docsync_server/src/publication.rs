//! Publications of several live queries.

use crate::config::PublisherConfig;
use crate::error::{PublishError, PublishResult};
use crate::live_query::LiveQuery;
use crate::publisher::{publish_cursor, PublishHandle};
use crate::subscriber::Subscriber;
use std::collections::HashSet;
use std::sync::Arc;

/// A set of live queries published to one subscriber.
#[derive(Debug)]
pub struct Publication {
    handles: Vec<PublishHandle>,
}

impl Publication {
    /// Publishes every query, then marks the subscriber ready.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::DuplicateCollection`] before publishing
    /// anything if two queries target one collection. If a query fails to
    /// start, queries already published are stopped.
    pub fn publish<Q: LiveQuery>(
        subscriber: Arc<dyn Subscriber>,
        queries: &[Q],
        config: &PublisherConfig,
    ) -> PublishResult<Self> {
        let mut seen = HashSet::new();
        for query in queries {
            if !seen.insert(query.collection_name()) {
                return Err(PublishError::DuplicateCollection {
                    collection: query.collection_name().to_string(),
                });
            }
        }

        let mut handles = Vec::with_capacity(queries.len());
        for query in queries {
            match publish_cursor(query, Arc::clone(&subscriber), config) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in &handles {
                        handle.stop();
                    }
                    return Err(err);
                }
            }
        }
        subscriber.ready();
        Ok(Self { handles })
    }

    /// Returns the published collections in publication order.
    pub fn collections(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.collection()).collect()
    }

    /// Returns the per-query handles.
    pub fn handles(&self) -> &[PublishHandle] {
        &self.handles
    }

    /// Stops every query.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Returns true once every query is stopped.
    pub fn is_stopped(&self) -> bool {
        self.handles.iter().all(PublishHandle::is_stopped)
    }
}
