use crate::errors::Ao3ApiError;
use crate::extraction::series::parse_series;
use crate::lazy::{LazyCell, Loadable};
use crate::session::{Session, SubscriptionKind};
use crate::types::{SeriesMetadata, WorkSummary};
use crate::works::Work;
use crate::Result;
use std::fmt;
use std::sync::Arc;

struct Inner {
    id: u64,
    session: Session,
    metadata: LazyCell<SeriesMetadata>,
}

/// An ordered collection of works.
#[derive(Clone)]
pub struct Series {
    inner: Arc<Inner>,
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("id", &self.inner.id)
            .field("metadata", &self.inner.metadata)
            .finish()
    }
}

impl Series {
    pub fn new(id: u64, session: Session) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                session,
                metadata: LazyCell::new(),
            }),
        }
    }

    pub fn load(id: u64, session: Session) -> Result<Self> {
        let series = Self::new(id, session);
        series.reload()?;
        Ok(series)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn url(&self) -> String {
        self.inner
            .session
            .requester()
            .url(&format!("/series/{}", self.inner.id))
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.record()?.name.clone())
    }

    pub fn creators(&self) -> Result<Vec<String>> {
        Ok(self.record()?.creators.clone())
    }

    pub fn work_list(&self) -> Result<Vec<WorkSummary>> {
        Ok(self.record()?.works.clone())
    }

    /// Unloaded handles to the series' works, in series order.
    pub fn works(&self) -> Result<Vec<Work>> {
        Ok(self
            .record()?
            .works
            .iter()
            .filter_map(|summary| summary.resolve(&self.inner.session))
            .collect())
    }

    pub fn subscribe(&self) -> Result<()> {
        self.inner
            .session
            .subscribe(SubscriptionKind::Series, self.inner.id)
    }

    pub fn unsubscribe(&self) -> Result<()> {
        let subscription_id = self
            .record()?
            .subscription_id
            .ok_or_else(|| Ao3ApiError::invalid_argument("you are not subscribed to this series"))?;
        self.inner
            .session
            .unsubscribe(SubscriptionKind::Series, self.inner.id, subscription_id)
    }
}

impl Loadable for Series {
    type Record = SeriesMetadata;

    fn cell(&self) -> &LazyCell<SeriesMetadata> {
        &self.inner.metadata
    }

    fn fetch(&self) -> Result<SeriesMetadata> {
        let body = match self.inner.session.get(&format!("/series/{}", self.inner.id)) {
            Err(Ao3ApiError::Http { status: 404, .. }) => {
                return Err(Ao3ApiError::InvalidId(format!(
                    "cannot find series {}",
                    self.inner.id
                )));
            }
            other => other?,
        };
        parse_series(&body, self.inner.id)
    }
}
