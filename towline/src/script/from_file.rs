use {
    super::TestScript,
    crate::{error::Error, logger::GeneralLogger, prelude::*},
    std::{collections::HashMap, io::BufRead, path::Path, sync::Arc},
};

/// Builds a configured script from the remainder of its configuration
/// line, the directory the configuration file lives in (for resolving
/// relative paths in the arguments), and the logger the script reports
/// to.
pub type ConfiguredScriptFactory =
    Box<dyn Fn(&str, &Path, Arc<GeneralLogger>) -> Arc<dyn TestScript> + Send + Sync>;

/// Builds the logger for one configuration line.
pub type LoggerFactory = Box<dyn Fn(&str) -> Arc<GeneralLogger>>;

/// Loads a test workload from a configuration file.
///
/// Each non-empty line is `TOKEN rest-of-line`; the token selects a
/// registered factory and the rest parameterizes it. One logger is built
/// per line so every script logs to its own sink.
#[derive(Default)]
pub struct ScriptsFromFile {
    factories: HashMap<String, ConfiguredScriptFactory>,
}

impl ScriptsFromFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_factory(&mut self, id_token: &str, factory: ConfiguredScriptFactory) {
        let previous = self.factories.insert(id_token.to_string(), factory);
        debug_assert!(previous.is_none(), "factory registered twice");
    }

    /// Reads the configuration, returning the scripts with their loggers
    /// in file order.
    pub fn tests_from_configuration<R>(
        &self,
        input: R,
        input_dir: &Path,
        logger_factory: LoggerFactory,
    ) -> Result<Vec<(Arc<dyn TestScript>, Arc<GeneralLogger>)>>
    where
        R: BufRead,
    {
        let mut tests = Vec::new();
        for line in input.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let logger = logger_factory(&line);
            let (token, rest) = match line.find(' ') {
                Some(split) => (&line[..split], &line[split + 1..]),
                None => (line.as_str(), ""),
            };
            let factory = self
                .factories
                .get(token)
                .ok_or_else(|| Error::MalformedScriptLine(line.clone()))?;
            debug!(token, "constructing test script");
            tests.push((factory(rest, input_dir, Arc::clone(&logger)), logger));
        }
        Ok(tests)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    struct NullScript;

    impl TestScript for NullScript {
        fn run(&self) {}
    }

    fn sink_logger() -> Arc<GeneralLogger> {
        Arc::new(GeneralLogger::to_writer(Box::new(std::io::sink()), false))
    }

    #[test]
    fn lines_select_factories_and_pass_the_rest() {
        let mut from_file = ScriptsFromFile::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_factory = Arc::clone(&seen);
        from_file.add_factory(
            "NOOP",
            Box::new(move |rest, _dir, _logger| {
                seen_in_factory.lock().unwrap().push(rest.to_string());
                Arc::new(NullScript)
            }),
        );

        let config = "NOOP first one\n\nNOOP\n";
        let loggers_built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loggers_built);
        let tests = from_file
            .tests_from_configuration(
                config.as_bytes(),
                Path::new("."),
                Box::new(move |_line| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sink_logger()
                }),
            )
            .unwrap();

        assert_eq!(tests.len(), 2);
        assert_eq!(loggers_built.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first one".to_string(), String::new()]);
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let from_file = ScriptsFromFile::new();
        let result = from_file.tests_from_configuration(
            "MYSTERY 1 2 3\n".as_bytes(),
            Path::new("."),
            Box::new(|_| sink_logger()),
        );
        assert!(matches!(result, Err(Error::MalformedScriptLine(_))));
    }
}
