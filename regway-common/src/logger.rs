use regway_error::{RGError, RGResult};
use regway_models::constants::{LOG_DIR, LOG_FILE_NAME};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{subscriber::set_global_default, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::DynFilterFn,
    fmt::{self},
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

/// Console + daily rolling file logger with a runtime adjustable level.
pub struct Logger {
    level: Arc<Mutex<Level>>,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Option<Level>) -> Self {
        Logger {
            level: Arc::new(Mutex::new(level.unwrap_or(Level::INFO))),
            _file_guard: None,
        }
    }

    /// Level used when nothing is configured: DEBUG for debug builds, INFO otherwise.
    pub fn build_default_level() -> Level {
        if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Parse a configured level name, falling back to the build default.
    pub fn parse_level(name: Option<&str>) -> Level {
        name.and_then(|n| n.trim().parse::<Level>().ok())
            .unwrap_or_else(Self::build_default_level)
    }

    #[inline]
    pub fn set_level(&self, new_level: Level) {
        let mut level = self.level.lock().unwrap_or_else(PoisonError::into_inner);
        *level = new_level;
    }

    #[inline]
    pub fn get_level(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the global subscriber: console output plus `logs/regway.log`.
    pub fn initialize(&mut self) -> RGResult<()> {
        let file_appender = rolling::daily(LOG_DIR, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        self._file_guard = Some(guard);

        fn level_filter<S>(level: Arc<Mutex<Level>>) -> impl Filter<S> + 'static
        where
            S: tracing::Subscriber,
        {
            DynFilterFn::new(move |metadata: &tracing::Metadata<'_>, _: &Context<'_, S>| {
                metadata.level() <= &*level.lock().unwrap_or_else(PoisonError::into_inner)
            })
        }
        let console_filter = level_filter(Arc::clone(&self.level));
        let file_filter = level_filter(Arc::clone(&self.level));

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(console_filter)
        };

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(file_filter);

        let subscriber = Registry::default().with(console_layer).with(file_layer);

        set_global_default(subscriber).map_err(|_| RGError::from("Failed to set logger"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_falls_back_to_build_default() {
        assert_eq!(Logger::parse_level(Some("warn")), Level::WARN);
        assert_eq!(Logger::parse_level(Some(" TRACE ")), Level::TRACE);
        assert_eq!(
            Logger::parse_level(Some("loud")),
            Logger::build_default_level()
        );
        assert_eq!(Logger::parse_level(None), Logger::build_default_level());
    }

    #[test]
    fn level_is_adjustable() {
        let logger = Logger::new(Some(Level::INFO));
        logger.set_level(Level::ERROR);
        assert_eq!(logger.get_level(), Level::ERROR);
    }
}
