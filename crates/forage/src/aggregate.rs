// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrent assembly of multiple dataset fetches into one bundle.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::fetcher::DatasetName;
use crate::Outcome;

/// Assembles the outcomes of several independent dataset fetches.
///
/// Each registered dataset is a future producing an [`Outcome`] - typically
/// a [`Fetcher::fetch_or_default`][crate::Fetcher::fetch_or_default] call.
/// [`assemble`][Self::assemble] drives them concurrently and always returns
/// a complete [`Bundle`]: a degraded dataset never blocks or fails the
/// others, which is what lets the surrounding system build a prompt from
/// whatever data is available.
///
/// # Examples
///
/// ```
/// use forage::{Aggregator, Outcome};
///
/// # futures::executor::block_on(async {
/// let bundle = Aggregator::new()
///     .dataset("categories", async { Outcome::Refreshed("shoes, bags".to_string()) })
///     .dataset("branches", async { Outcome::Fresh("downtown".to_string()) })
///     .assemble()
///     .await;
///
/// assert_eq!(bundle.len(), 2);
/// assert_eq!(*bundle.get("branches").unwrap().value(), "downtown");
/// # });
/// ```
pub struct Aggregator<'a, V> {
    datasets: Vec<(DatasetName, BoxFuture<'a, Outcome<V>>)>,
}

impl<V> std::fmt::Debug for Aggregator<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("datasets", &self.datasets.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish()
    }
}

impl<V> Default for Aggregator<'_, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, V> Aggregator<'a, V> {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self { datasets: Vec::new() }
    }

    /// Registers a dataset fetch under a name.
    ///
    /// Names identify sections in the resulting bundle and should be unique;
    /// a duplicate name is kept but only the first registration is reachable
    /// through [`Bundle::get`].
    #[must_use]
    pub fn dataset<F>(mut self, name: DatasetName, fetch: F) -> Self
    where
        F: Future<Output = Outcome<V>> + Send + 'a,
    {
        self.datasets.push((name, fetch.boxed()));
        self
    }

    /// Drives every registered fetch concurrently and collects the results.
    ///
    /// This operation is infallible: each fetch resolves to an [`Outcome`]
    /// carrying a usable value, so the bundle is always complete.
    pub async fn assemble(self) -> Bundle<V> {
        let (names, fetches): (Vec<_>, Vec<_>) = self.datasets.into_iter().unzip();
        let outcomes = join_all(fetches).await;

        let bundle = Bundle {
            sections: names.into_iter().zip(outcomes).collect(),
        };
        tracing::event!(
            name: "forage.aggregate.assembled",
            tracing::Level::DEBUG,
            datasets = bundle.len(),
            degraded = bundle.degraded_count(),
        );
        bundle
    }
}

/// The best-available outcome for every dataset an [`Aggregator`] drove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle<V> {
    sections: Vec<(DatasetName, Outcome<V>)>,
}

impl<V> Bundle<V> {
    /// Returns the outcome for a named dataset.
    #[must_use]
    pub fn get(&self, name: DatasetName) -> Option<&Outcome<V>> {
        self.sections
            .iter()
            .find_map(|(section, outcome)| (*section == name).then_some(outcome))
    }

    /// Iterates over the sections in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (DatasetName, &Outcome<V>)> {
        self.sections.iter().map(|(name, outcome)| (*name, outcome))
    }

    /// Returns the names of datasets that were served degraded data.
    pub fn degraded_datasets(&self) -> impl Iterator<Item = DatasetName> {
        self.sections
            .iter()
            .filter_map(|(name, outcome)| outcome.is_degraded().then_some(*name))
    }

    /// Returns how many datasets were served degraded data.
    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.sections.iter().filter(|(_, outcome)| outcome.is_degraded()).count()
    }

    /// Returns the number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true if no datasets were registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl<V> IntoIterator for Bundle<V> {
    type Item = (DatasetName, Outcome<V>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.sections.into_iter()
    }
}
