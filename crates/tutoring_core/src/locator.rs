//! crates/tutoring_core/src/locator.rs
//!
//! Finds a student's active record(s) across the subject-partitioned collections.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::LocatedStudent;
use crate::phone::PhoneVariants;
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::routing::{Route, RoutingTable};

#[derive(Clone)]
pub struct StudentLocator {
    db: Arc<dyn DatabaseService>,
    routes: Arc<RoutingTable>,
}

impl StudentLocator {
    pub fn new(db: Arc<dyn DatabaseService>, routes: Arc<RoutingTable>) -> Self {
        Self { db, routes }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Looks the phone up in the collection of one route.
    pub async fn locate(
        &self,
        phones: &PhoneVariants,
        route: &Route,
    ) -> PortResult<Option<LocatedStudent>> {
        if phones.is_empty() {
            return Ok(None);
        }
        let record = self
            .db
            .find_active_student(&route.collection, phones.as_slice())
            .await?;
        Ok(record.map(|record| LocatedStudent {
            collection: route.collection.clone(),
            record,
        }))
    }

    /// Searches every collection of `grade` (every grade when `None`) and returns
    /// the records found, keyed by `grade/subject`.
    pub async fn locate_all(
        &self,
        phones: &PhoneVariants,
        grade: Option<&str>,
    ) -> PortResult<BTreeMap<String, LocatedStudent>> {
        let routes = self.routes.routes_for(grade);
        let lookups = routes.iter().map(|route| async move {
            let key = format!("{}/{}", route.grade, route.subject);
            let found = self.locate(phones, route).await?;
            Ok::<_, PortError>(found.map(|student| (key, student)))
        });

        let found = try_join_all(lookups).await?;
        Ok(found.into_iter().flatten().collect())
    }
}
