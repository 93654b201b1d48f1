use crate::{
    config::Config,
    cycle::{CycleState, SingleComputationCycle},
    error::CycleError,
};
use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::info;

impl<C: Config> SingleComputationCycle<'_, C> {
    /// Releases the snapshot and every cache of this cycle and moves it to
    /// [`CycleState::Cleaned`].
    ///
    /// When the view asks for it the caches are dumped to disk first; the
    /// paths written are returned. A failed dump does not prevent the release.
    ///
    /// # Errors
    /// The cycle is neither [`CycleState::Finished`] nor
    /// [`CycleState::ExecutionInterrupted`], or the cache dump failed.
    pub fn release_resources(&mut self) -> Result<Vec<PathBuf>, CycleError> {
        self.require_state(&[CycleState::Finished, CycleState::ExecutionInterrupted])?;

        let dumped = if self.view.definition().is_dump_computation_cache_to_disk() {
            self.dump_computation_caches_to_disk()
        } else {
            Ok(Vec::new())
        };

        let timestamp = self.valuation_timestamp_millis();
        self.snapshot_provider.release_snapshot(timestamp);
        self.view
            .processing_context()
            .cache_source
            .release_caches(self.view.name(), timestamp);

        self.state = CycleState::Cleaned;
        dumped
    }

    /// Writes every output value of every configuration's cache, as text, to
    /// a fresh temporary file per configuration.
    ///
    /// Each line reads `<specification> -> <value>`, ordered by specification,
    /// with `null` for values not in the cache. Files are created in the
    /// view's dump directory, or the system temporary directory, and kept.
    ///
    /// # Errors
    /// A file could not be created or written.
    pub fn dump_computation_caches_to_disk(&self) -> Result<Vec<PathBuf>, CycleError> {
        let directory = self.view.definition().dump_directory();
        let mut paths = Vec::with_capacity(self.caches.len());
        for (name, graph) in self.evaluation_model.dependency_graphs() {
            let Some(cache) = self.caches.get(name) else {
                continue;
            };
            let entries: BTreeMap<String, String> = graph
                .output_values()
                .map(|specification| {
                    let value = cache
                        .get_value(specification)
                        .map_or_else(|| "null".to_owned(), |value| value.to_string());
                    (specification.to_string(), value)
                })
                .collect();

            let path = write_cache_dump(name, &entries, directory.map(PathBuf::as_path)).map_err(
                |source| CycleError::CacheDump {
                    configuration: name.to_owned(),
                    source,
                },
            )?;
            info!(
                "Dumped cache for calc conf {name} to {}",
                path.display()
            );
            paths.push(path);
        }
        Ok(paths)
    }
}

fn write_cache_dump(
    configuration_name: &str,
    entries: &BTreeMap<String, String>,
    directory: Option<&Path>,
) -> io::Result<PathBuf> {
    let prefix = format!("computation-cache-{configuration_name}-");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".txt");
    let mut file = match directory {
        Some(directory) => builder.tempfile_in(directory)?,
        None => builder.tempfile()?,
    };
    for (specification, value) in entries {
        writeln!(file, "{specification} -> {value}")?;
    }
    file.flush()?;
    let (_, path) = file.keep().map_err(|err| err.error)?;
    Ok(path)
}
