use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter directive for a `-v` count. `RUST_LOG` wins when set.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only (dropped frames, listener failures)
	// 1 (-v) = connection lifecycle and retries
	// 2+ (-vv) = every frame
	match verbosity {
		0 => "warn",
		1 => "info,bidi_runtime=debug",
		_ => "trace",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	// stdout carries results and events; logs stay on stderr.
	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_filters_parse() {
		for verbosity in 0..4 {
			EnvFilter::try_new(default_filter(verbosity)).unwrap();
		}
		assert_eq!(default_filter(7), "trace");
	}
}
