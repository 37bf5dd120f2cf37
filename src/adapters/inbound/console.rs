//! Console Adapter
//!
//! Line-oriented stand-in for an input method front end. Each input line is
//! a pinyin key to look up; completions are printed as `key<TAB>result`.
//!
//! Besides keys the console understands:
//! - the toggle hotkey text (e.g. `Control+Alt+Shift+C`)
//! - the reset hotkey text (e.g. `Control+Alt+Shift+R`)
//! - `:stats` to print lookup counters
//! - `:backend google|baidu|none` to switch providers

use crate::application::LookupService;
use crate::domain::value_objects::{BackendKind, Hotkey};
use crate::infrastructure::shutdown::ShutdownController;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Console - inbound adapter driving a [`LookupService`].
pub struct Console {
    service: LookupService,
    toggle_key: Hotkey,
    reset_key: Hotkey,
    shutdown: ShutdownController,
}

impl Console {
    pub fn new(
        service: LookupService,
        toggle_key: Hotkey,
        reset_key: Hotkey,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            service,
            toggle_key,
            reset_key,
            shutdown,
        }
    }

    /// Run against stdin and stdout until EOF or shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with(stdin, stdout).await
    }

    /// Run the event loop over arbitrary input and output.
    ///
    /// On EOF the loop keeps waiting until every in-flight lookup has been
    /// delivered. A shutdown signal stops it immediately and discards
    /// unfinished lookups.
    pub async fn run_with<R, W>(mut self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // One iteration delivers either a single synchronous answer or one
        // drain of at most `slot_capacity` completions, and every iteration
        // empties the channel.
        let (results_tx, mut results_rx) =
            mpsc::channel::<(String, String)>(self.service.stats().slot_capacity + 1);
        let finished = self.service.finished_signal();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut lines = input.lines();
        let mut input_open = true;

        tracing::info!(
            "console ready (toggle: {}, reset: {})",
            self.toggle_key,
            self.reset_key
        );

        loop {
            if !input_open && self.service.in_flight() == 0 {
                break;
            }
            if self.shutdown.is_shutdown() {
                break;
            }

            tokio::select! {
                line = lines.next_line(), if input_open => {
                    match line? {
                        Some(line) => {
                            let reply = self.handle_line(line.trim(), &results_tx);
                            if let Some(reply) = reply {
                                output.write_all(reply.as_bytes()).await?;
                                output.write_all(b"\n").await?;
                            }
                        }
                        None => {
                            tracing::debug!("console input closed");
                            input_open = false;
                        }
                    }
                }
                _ = finished.notified() => {
                    let delivered = self.service.drain();
                    tracing::debug!("delivered {} lookups", delivered);
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }

            while let Ok((key, result)) = results_rx.try_recv() {
                output
                    .write_all(format!("{}\t{}\n", key, result).as_bytes())
                    .await?;
            }
            output.flush().await?;
        }

        self.service.shutdown();
        Ok(())
    }

    fn handle_line(
        &mut self,
        line: &str,
        results: &mpsc::Sender<(String, String)>,
    ) -> Option<String> {
        if line.is_empty() {
            return None;
        }

        if self.toggle_key.matches(line) {
            let enabled = self.service.toggle();
            return Some(format!(
                "cloud pinyin {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        }

        if self.reset_key.matches(line) {
            self.service.reset_error();
            return Some("error count reset".to_string());
        }

        if line == ":stats" {
            return Some(self.format_stats());
        }

        if let Some(name) = line.strip_prefix(":backend") {
            let name = name.trim();
            let backend = if name == "none" {
                None
            } else {
                match BackendKind::from_name(name) {
                    Some(kind) => Some(kind),
                    None => return Some(format!("unknown backend '{}'", name)),
                }
            };
            self.service.set_backend(backend);
            return Some(format!("backend: {}", name));
        }

        let results = results.clone();
        self.service.request(line, move |key, result| {
            if let Err(e) = results.try_send((key.to_string(), result.to_string())) {
                tracing::warn!("dropping completion for '{}': {}", key, e);
            }
        });
        None
    }

    fn format_stats(&self) -> String {
        let stats = self.service.stats();
        format!(
            "requests={} cache_hits={} network={} failures={} short_circuited={} parse_misses={} in_flight={}/{} cached={} backoff={}",
            stats.requests,
            stats.cache_hits,
            stats.network_lookups,
            stats.transport_failures,
            stats.short_circuited,
            stats.parse_misses,
            stats.in_flight,
            stats.slot_capacity,
            stats.cached_entries,
            self.service.backoff_state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::LookupOptions;
    use crate::infrastructure::fetch_engine::EngineConfig;
    use std::time::Duration;

    fn console(options: LookupOptions) -> Console {
        let service = LookupService::start(options, EngineConfig::default()).unwrap();
        Console::new(
            service,
            Hotkey::parse("Control+Alt+Shift+C").unwrap(),
            Hotkey::parse("Control+Alt+Shift+R").unwrap(),
            ShutdownController::new(),
        )
    }

    async fn run(console: Console, input: &str) -> String {
        let mut output = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            console.run_with(input.as_bytes(), &mut output),
        )
        .await
        .unwrap()
        .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_short_key_prints_empty_result() {
        let output = run(console(LookupOptions::default()), "nih\n").await;
        assert_eq!(output, "nih\t\n");
    }

    #[tokio::test]
    async fn test_small_pool_delivers_every_answer() {
        let options = LookupOptions {
            max_requests: 1,
            ..Default::default()
        };
        let output = run(console(options), "a\nbb\nccc\n").await;
        assert_eq!(output, "a\t\nbb\t\nccc\t\n");
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let output = run(console(LookupOptions::default()), "\n   \n").await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_hotkey() {
        let output = run(
            console(LookupOptions::default()),
            "Control+Alt+Shift+C\nctrl+alt+shift+c\n",
        )
        .await;
        assert_eq!(output, "cloud pinyin disabled\ncloud pinyin enabled\n");
    }

    #[tokio::test]
    async fn test_disabled_lookup_prints_empty_result() {
        let output = run(
            console(LookupOptions::default()),
            "Control+Alt+Shift+C\nnihao\n",
        )
        .await;
        assert_eq!(output, "cloud pinyin disabled\nnihao\t\n");
    }

    #[tokio::test]
    async fn test_reset_hotkey() {
        let output = run(console(LookupOptions::default()), "Control+Alt+Shift+R\n").await;
        assert_eq!(output, "error count reset\n");
    }

    #[tokio::test]
    async fn test_backend_command() {
        let output = run(
            console(LookupOptions::default()),
            ":backend baidu\n:backend bing\n:backend none\nnihao\n",
        )
        .await;
        assert_eq!(
            output,
            "backend: baidu\nunknown backend 'bing'\nbackend: none\nnihao\t\n"
        );
    }

    #[tokio::test]
    async fn test_stats_command() {
        let output = run(console(LookupOptions::default()), "ab\n:stats\n").await;
        assert!(output.starts_with("ab\t\n"));
        assert!(output.contains("requests=1"));
        assert!(output.contains("short_circuited=1"));
        assert!(output.contains("in_flight=0/100"));
        assert!(output.contains("backoff=healthy"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let console = console(LookupOptions::default());
        console.shutdown.shutdown();
        let (reader, _writer) = tokio::io::duplex(64);
        let mut output = Vec::new();

        tokio::time::timeout(
            Duration::from_secs(5),
            console.run_with(BufReader::new(reader), &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(output.is_empty());
    }
}
