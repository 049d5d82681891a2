use std::sync::Arc;

use crate::cache::{MemoryWebListCache, WebListCache};
use crate::clock::{Clock, SystemClock};
use crate::fetch::{Fetcher, HttpFetcher, NilFetcher};
use crate::idn::{IdnNormalizer, IdnaNormalizer};

#[cfg(feature = "async")]
use crate::fetch::AsyncFetcher;

/// External collaborators a [`Filter`](super::Filter) calls into.
#[derive(Clone)]
pub struct FilterServices {
    pub cache: Arc<dyn WebListCache>,
    pub fetcher: Arc<dyn Fetcher>,
    #[cfg(feature = "async")]
    pub async_fetcher: Arc<dyn AsyncFetcher>,
    pub idn: Arc<dyn IdnNormalizer>,
    pub clock: Arc<dyn Clock>,
}

impl Default for FilterServices {
    /// In-memory cache, HTTP fetching, `idna` conversion and the system clock.
    fn default() -> Self {
        Self::with_any_fetcher(Arc::new(HttpFetcher::new()))
    }
}

impl FilterServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services that never touch the network.
    pub fn offline() -> Self {
        Self::with_any_fetcher(Arc::new(NilFetcher))
    }

    #[cfg(feature = "async")]
    fn with_any_fetcher<F>(fetcher: Arc<F>) -> Self
    where
        F: Fetcher + AsyncFetcher + 'static,
    {
        Self {
            cache: Arc::new(MemoryWebListCache::new()),
            fetcher: fetcher.clone(),
            async_fetcher: fetcher,
            idn: Arc::new(IdnaNormalizer::new()),
            clock: Arc::new(SystemClock),
        }
    }

    #[cfg(not(feature = "async"))]
    fn with_any_fetcher<F>(fetcher: Arc<F>) -> Self
    where
        F: Fetcher + 'static,
    {
        Self {
            cache: Arc::new(MemoryWebListCache::new()),
            fetcher,
            idn: Arc::new(IdnaNormalizer::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the web list cache.
    pub fn with_cache(mut self, cache: Arc<dyn WebListCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the fetcher used by both the blocking and the async API.
    #[cfg(feature = "async")]
    pub fn with_fetcher<F>(mut self, fetcher: Arc<F>) -> Self
    where
        F: Fetcher + AsyncFetcher + 'static,
    {
        self.fetcher = fetcher.clone();
        self.async_fetcher = fetcher;
        self
    }

    /// Set the fetcher.
    #[cfg(not(feature = "async"))]
    pub fn with_fetcher<F>(mut self, fetcher: Arc<F>) -> Self
    where
        F: Fetcher + 'static,
    {
        self.fetcher = fetcher;
        self
    }

    /// Set the IDN converter.
    pub fn with_idn(mut self, idn: Arc<dyn IdnNormalizer>) -> Self {
        self.idn = idn;
        self
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
