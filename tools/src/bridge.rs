//! The bridge: tool registry plus the per-instance state every handler shares.

use std::sync::Arc;
use std::time::Duration;

use outpost_types::{RemotePath, ToolCallResult, ToolDefinition};
use serde_json::Value;

use crate::builtins::register_builtins;
use crate::{
    CommandExecutor, EditOverrides, PathResolver, RemoteFs, ReviewGate, ToolCtx, ToolError,
    ToolRegistry, ToolSettings, UpdateNotifier, WriteCache, validate_args,
};

pub struct Bridge {
    registry: ToolRegistry,
    ctx: ToolCtx,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

impl Bridge {
    #[must_use]
    pub fn builder(
        resolver: PathResolver,
        fs: Arc<dyn RemoteFs>,
        executor: Arc<dyn CommandExecutor>,
    ) -> BridgeBuilder {
        BridgeBuilder {
            ctx: ToolCtx::new(resolver, fs, executor),
            write_cache_ttl: None,
            override_ttl: None,
        }
    }

    /// Run one tool call. Never fails: every error becomes an error result.
    pub async fn call(&self, name: &str, input: Value) -> ToolCallResult {
        match self.dispatch(name, input).await {
            Ok(output) => ToolCallResult::success(output),
            Err(e) => {
                match &e {
                    ToolError::BadArgs { .. } | ToolError::UnknownTool { .. } => {
                        tracing::warn!(tool = name, "rejected tool call: {e}");
                    }
                    ToolError::CommandFailed { exit_code, .. } => {
                        tracing::debug!(tool = name, exit_code, "command exited non-zero");
                    }
                    _ => tracing::warn!(tool = name, "tool call failed: {e}"),
                }
                ToolCallResult::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, name: &str, input: Value) -> Result<String, ToolError> {
        let tool = self.registry.lookup(name)?;
        validate_args(&tool.schema(), &input)?;
        if tool.is_side_effecting() {
            tracing::info!(tool = name, "running side-effecting tool");
        } else {
            tracing::debug!(tool = name, "running tool");
        }
        tool.execute(input, &self.ctx).await
    }

    /// Post reviewed content for the next write or edit of `logical`.
    /// Returns the remote path the override was filed under.
    pub fn set_override(&self, logical: &str, content: impl Into<String>) -> RemotePath {
        let path = self.ctx.resolver.to_remote_path(logical);
        self.ctx.overrides.set(&path, content);
        tracing::debug!(%path, "edit override posted");
        path
    }

    /// Drop cached writes and pending overrides.
    pub fn clear_state(&self) {
        self.ctx.write_cache.clear();
        self.ctx.overrides.clear();
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.ctx.resolver
    }
}

#[must_use]
pub struct BridgeBuilder {
    ctx: ToolCtx,
    write_cache_ttl: Option<Duration>,
    override_ttl: Option<Duration>,
}

impl BridgeBuilder {
    pub fn settings(mut self, settings: ToolSettings) -> Self {
        self.ctx.settings = settings;
        self
    }

    pub fn review_gate(mut self, gate: Arc<dyn ReviewGate>) -> Self {
        self.ctx.review_gate = Some(gate);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn UpdateNotifier>) -> Self {
        self.ctx.notifier = Some(notifier);
        self
    }

    pub fn write_cache_ttl(mut self, ttl: Duration) -> Self {
        self.write_cache_ttl = Some(ttl);
        self
    }

    pub fn override_ttl(mut self, ttl: Duration) -> Self {
        self.override_ttl = Some(ttl);
        self
    }

    pub fn build(mut self) -> Result<Bridge, ToolError> {
        if let Some(ttl) = self.write_cache_ttl {
            self.ctx.write_cache = WriteCache::new(ttl);
        }
        if let Some(ttl) = self.override_ttl {
            self.ctx.overrides = EditOverrides::new(ttl);
        }
        let mut registry = ToolRegistry::default();
        register_builtins(&mut registry)?;
        Ok(Bridge {
            registry,
            ctx: self.ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Bridge;
    use crate::exec::{CommandExecutor, ExecFut};
    use crate::hooks::{
        ChannelNotifier, ReviewDecision, ReviewFut, ReviewGate, ReviewRequest,
    };
    use crate::transport::{MemoryFs, RemoteFs};
    use crate::{PathResolver, ToolSettings};
    use outpost_types::{ExecOutput, RemoteLocator, RemotePath};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Echoes back what it was asked to run.
    struct Echo {
        seen: Mutex<Vec<(String, Option<RemotePath>, Duration)>>,
        exit_code: i32,
    }

    impl Echo {
        fn new(exit_code: i32) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                exit_code,
            })
        }
    }

    impl CommandExecutor for Echo {
        fn execute<'a>(
            &'a self,
            command: &'a str,
            cwd: Option<&'a RemotePath>,
            timeout: Duration,
        ) -> ExecFut<'a> {
            Box::pin(async move {
                self.seen
                    .lock()
                    .unwrap()
                    .push((command.to_string(), cwd.cloned(), timeout));
                let stdout = if command == "true" {
                    String::new()
                } else {
                    format!("ran {command}\n")
                };
                Ok(ExecOutput {
                    stdout,
                    stderr: String::new(),
                    exit_code: self.exit_code,
                })
            })
        }
    }

    enum Verdict {
        Accept,
        Amend(&'static str),
        Reject,
        Stall,
    }

    struct Gate {
        verdict: Verdict,
        seen: Mutex<Vec<(String, Option<String>, String)>>,
    }

    impl Gate {
        fn new(verdict: Verdict) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl ReviewGate for Gate {
        fn review<'a>(&'a self, request: ReviewRequest<'a>) -> ReviewFut<'a> {
            Box::pin(async move {
                self.seen.lock().unwrap().push((
                    request.tool_name.to_string(),
                    request.old_content.map(str::to_string),
                    request.new_content.to_string(),
                ));
                match self.verdict {
                    Verdict::Accept => ReviewDecision::Accepted {
                        final_content: request.new_content.to_string(),
                    },
                    Verdict::Amend(content) => ReviewDecision::Accepted {
                        final_content: content.to_string(),
                    },
                    Verdict::Reject => ReviewDecision::Rejected {
                        reason: Some("no thanks".to_string()),
                    },
                    Verdict::Stall => std::future::pending().await,
                }
            })
        }
    }

    fn resolver() -> PathResolver {
        PathResolver::new("/home/me/app", Some("/srv/app"), "devbox").unwrap()
    }

    fn path(raw: &str) -> RemotePath {
        RemotePath::new(raw).unwrap()
    }

    fn bridge(fs: &Arc<MemoryFs>) -> Bridge {
        Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn lists_six_tools_sorted() {
        let fs = Arc::new(MemoryFs::new());
        let names: Vec<String> = bridge(&fs)
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            vec!["bash", "edit_file", "glob", "grep", "read_file", "write_file"]
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_args_are_error_results() {
        let fs = Arc::new(MemoryFs::new());
        let bridge = bridge(&fs);
        let result = bridge.call("delete_everything", json!({})).await;
        assert!(result.is_error);
        assert!(result.output.contains("Unknown tool"));

        let result = bridge.call("read_file", json!({"offset": 2})).await;
        assert!(result.is_error);
        assert!(result.output.contains("Bad tool args"));
    }

    #[tokio::test]
    async fn write_then_read_survives_lagging_remote() {
        let fs = Arc::new(MemoryFs::lagging());
        let bridge = bridge(&fs);
        let write = bridge
            .call("write_file", json!({"path": "notes.txt", "content": "fresh\n"}))
            .await;
        assert!(!write.is_error, "{}", write.output);
        assert_eq!(write.output, "Created /srv/app/notes.txt (+1 -0)");

        let read = bridge.call("read_file", json!({"path": "/home/me/app/notes.txt"})).await;
        assert_eq!(read.output, "fresh\n");
        // The remote still serves nothing; only the cache made that read work.
        let remote = fs
            .read(&RemoteLocator::new("devbox", path("/srv/app/notes.txt")))
            .await;
        assert!(remote.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expiry_falls_through_to_live_read() {
        let fs = Arc::new(MemoryFs::lagging());
        fs.insert(&path("/srv/app/a.txt"), "remote v0");
        let bridge = bridge(&fs);
        bridge
            .call("write_file", json!({"path": "a.txt", "content": "v1"}))
            .await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let read = bridge.call("read_file", json!({"path": "a.txt"})).await;
        assert_eq!(read.output, "remote v0");
    }

    #[tokio::test]
    async fn read_file_slices_by_offset_and_limit() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/lines.txt"), "one\ntwo\nthree\nfour\n");
        let bridge = bridge(&fs);
        let read = bridge
            .call("read_file", json!({"path": "lines.txt", "offset": 2, "limit": 2}))
            .await;
        assert_eq!(read.output, "two\nthree\n");

        let past = bridge
            .call("read_file", json!({"path": "lines.txt", "offset": 10}))
            .await;
        assert!(!past.is_error);
        assert_eq!(past.output, "offset 10 is beyond end of file (4 lines)");
    }

    #[tokio::test]
    async fn read_file_edge_cases() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/empty.txt"), "");
        fs.insert(&path("/srv/app/bin.dat"), vec![0x66, 0x6f, 0xff, 0x6f]);
        let bridge = bridge(&fs);
        assert_eq!(
            bridge.call("read_file", json!({"path": "empty.txt"})).await.output,
            "(empty file)"
        );
        assert_eq!(
            bridge.call("read_file", json!({"path": "bin.dat"})).await.output,
            "fo\u{fffd}o"
        );
        let missing = bridge.call("read_file", json!({"path": "nope.txt"})).await;
        assert!(missing.is_error);
        assert!(missing.output.contains("File not found"));
    }

    #[tokio::test]
    async fn large_reads_are_truncated_in_the_middle() {
        let fs = Arc::new(MemoryFs::new());
        let body = format!("{}{}", "a".repeat(20_000), "z".repeat(20_000));
        fs.insert(&path("/srv/app/big.txt"), body);
        let bridge = bridge(&fs);
        let read = bridge.call("read_file", json!({"path": "big.txt"})).await;
        assert!(read.output.starts_with("aaaa"));
        assert!(read.output.ends_with("zzzz"));
        assert!(read.output.contains(outpost_types::TRUNCATION_MARKER));
        assert!(
            read.output.chars().count()
                <= 30_000 + outpost_types::TRUNCATION_MARKER.chars().count()
        );
    }

    #[tokio::test]
    async fn edit_requires_exactly_one_occurrence() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/m.rs"), "let a = 1;\nlet b = 1;\n");
        let bridge = bridge(&fs);

        let none = bridge
            .call(
                "edit_file",
                json!({"path": "m.rs", "old_string": "let c", "new_string": "let d"}),
            )
            .await;
        assert!(none.is_error);
        assert!(none.output.contains("not found"));

        let many = bridge
            .call(
                "edit_file",
                json!({"path": "m.rs", "old_string": "= 1;", "new_string": "= 2;"}),
            )
            .await;
        assert!(many.is_error);
        assert!(many.output.contains("matches 2 locations"));

        let one = bridge
            .call(
                "edit_file",
                json!({"path": "m.rs", "old_string": "let b = 1;", "new_string": "let b = 2;"}),
            )
            .await;
        assert!(!one.is_error, "{}", one.output);
        assert_eq!(one.output, "Edited /srv/app/m.rs (+1 -1)");
        assert_eq!(
            fs.latest(&path("/srv/app/m.rs")).unwrap(),
            b"let a = 1;\nlet b = 2;\n"
        );
    }

    #[tokio::test]
    async fn edit_rejects_empty_and_noop() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/m.rs"), "x");
        let bridge = bridge(&fs);
        let empty = bridge
            .call("edit_file", json!({"path": "m.rs", "old_string": "", "new_string": "y"}))
            .await;
        assert!(empty.is_error);
        let noop = bridge
            .call("edit_file", json!({"path": "m.rs", "old_string": "x", "new_string": "x"}))
            .await;
        assert!(noop.is_error);
        assert!(fs.write_log().is_empty());
    }

    #[tokio::test]
    async fn edit_reads_through_write_cache() {
        let fs = Arc::new(MemoryFs::lagging());
        let bridge = bridge(&fs);
        bridge
            .call("write_file", json!({"path": "c.txt", "content": "alpha beta"}))
            .await;
        let edit = bridge
            .call(
                "edit_file",
                json!({"path": "c.txt", "old_string": "beta", "new_string": "gamma"}),
            )
            .await;
        assert!(!edit.is_error, "{}", edit.output);
        let read = bridge.call("read_file", json!({"path": "c.txt"})).await;
        assert_eq!(read.output, "alpha gamma");
    }

    #[tokio::test]
    async fn override_wins_once_and_skips_review() {
        let fs = Arc::new(MemoryFs::new());
        let gate = Gate::new(Verdict::Reject);
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .review_gate(gate.clone())
            .build()
            .unwrap();

        let filed = bridge.set_override("/home/me/app/o.txt", "reviewed");
        assert_eq!(filed.as_str(), "/srv/app/o.txt");
        let first = bridge
            .call("write_file", json!({"path": "o.txt", "content": "agent"}))
            .await;
        assert!(!first.is_error, "{}", first.output);
        assert_eq!(fs.latest(&path("/srv/app/o.txt")).unwrap(), b"reviewed");
        assert!(gate.seen.lock().unwrap().is_empty());

        let second = bridge
            .call("write_file", json!({"path": "o.txt", "content": "agent"}))
            .await;
        assert!(second.is_error);
        assert!(second.output.contains("rejected: no thanks"));
        assert_eq!(fs.latest(&path("/srv/app/o.txt")).unwrap(), b"reviewed");
    }

    #[tokio::test]
    async fn override_for_other_path_is_kept() {
        let fs = Arc::new(MemoryFs::new());
        let bridge = bridge(&fs);
        bridge.set_override("b.txt", "for b");
        bridge
            .call("write_file", json!({"path": "a.txt", "content": "a"}))
            .await;
        bridge
            .call("write_file", json!({"path": "b.txt", "content": "agent b"}))
            .await;
        assert_eq!(fs.latest(&path("/srv/app/a.txt")).unwrap(), b"a");
        assert_eq!(fs.latest(&path("/srv/app/b.txt")).unwrap(), b"for b");
    }

    #[tokio::test]
    async fn edit_override_wins_and_skips_review() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/e.rs"), "fn a() {}\n");
        let gate = Gate::new(Verdict::Reject);
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .review_gate(gate.clone())
            .build()
            .unwrap();

        bridge.set_override("e.rs", "fn reviewed() {}\n");
        let result = bridge
            .call(
                "edit_file",
                json!({"path": "e.rs", "old_string": "fn a", "new_string": "fn b"}),
            )
            .await;
        assert!(!result.is_error, "{}", result.output);
        assert_eq!(result.output, "Wrote reviewed content to /srv/app/e.rs (+1 -1)");
        assert_eq!(
            fs.latest(&path("/srv/app/e.rs")).unwrap(),
            b"fn reviewed() {}\n"
        );
        assert!(gate.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_override_beats_edit_argument_checks() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/m.rs"), "x");
        let bridge = bridge(&fs);

        bridge.set_override("m.rs", "from review");
        let empty = bridge
            .call("edit_file", json!({"path": "m.rs", "old_string": "", "new_string": "y"}))
            .await;
        assert!(!empty.is_error, "{}", empty.output);
        assert_eq!(fs.latest(&path("/srv/app/m.rs")).unwrap(), b"from review");

        bridge.set_override("m.rs", "second review");
        let noop = bridge
            .call("edit_file", json!({"path": "m.rs", "old_string": "x", "new_string": "x"}))
            .await;
        assert!(!noop.is_error, "{}", noop.output);
        assert_eq!(fs.latest(&path("/srv/app/m.rs")).unwrap(), b"second review");
    }

    /// Accepts the agent's content, but posts its own override while deciding.
    struct PostingGate {
        bridge: std::sync::OnceLock<std::sync::Weak<Bridge>>,
        content: &'static str,
    }

    impl ReviewGate for PostingGate {
        fn review<'a>(&'a self, request: ReviewRequest<'a>) -> ReviewFut<'a> {
            Box::pin(async move {
                if let Some(bridge) = self.bridge.get().and_then(std::sync::Weak::upgrade) {
                    bridge.set_override(request.path.as_str(), self.content);
                }
                ReviewDecision::Accepted {
                    final_content: request.new_content.to_string(),
                }
            })
        }
    }

    fn posting_bridge(fs: &Arc<MemoryFs>, content: &'static str) -> Arc<Bridge> {
        let gate = Arc::new(PostingGate {
            bridge: std::sync::OnceLock::new(),
            content,
        });
        let bridge = Arc::new(
            Bridge::builder(resolver(), fs.clone(), Echo::new(0))
                .review_gate(gate.clone())
                .build()
                .unwrap(),
        );
        gate.bridge.set(Arc::downgrade(&bridge)).unwrap();
        bridge
    }

    #[tokio::test]
    async fn override_posted_during_review_wins() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/w.txt"), "old\n");
        let bridge = posting_bridge(&fs, "posted\n");

        let write = bridge
            .call("write_file", json!({"path": "w.txt", "content": "agent\n"}))
            .await;
        assert!(!write.is_error, "{}", write.output);
        assert_eq!(fs.latest(&path("/srv/app/w.txt")).unwrap(), b"posted\n");

        let edit = bridge
            .call(
                "edit_file",
                json!({"path": "w.txt", "old_string": "posted", "new_string": "agent"}),
            )
            .await;
        assert!(!edit.is_error, "{}", edit.output);
        assert_eq!(fs.latest(&path("/srv/app/w.txt")).unwrap(), b"posted\n");
        // Consumed by the write it applied to.
        let again = bridge
            .call(
                "edit_file",
                json!({"path": "w.txt", "old_string": "missing", "new_string": "x"}),
            )
            .await;
        assert!(again.is_error);
        assert!(again.output.contains("not found"));
    }

    #[tokio::test]
    async fn review_can_amend_content() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(&path("/srv/app/r.txt"), "old\n");
        let gate = Gate::new(Verdict::Amend("amended\n"));
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .review_gate(gate.clone())
            .build()
            .unwrap();
        let result = bridge
            .call("write_file", json!({"path": "r.txt", "content": "proposed\n"}))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.output, "Updated /srv/app/r.txt (+1 -1)");
        assert_eq!(fs.latest(&path("/srv/app/r.txt")).unwrap(), b"amended\n");
        let seen = gate.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(
                "write_file".to_string(),
                Some("old\n".to_string()),
                "proposed\n".to_string()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_review_is_a_rejection() {
        let fs = Arc::new(MemoryFs::new());
        let settings = ToolSettings {
            review_timeout: Duration::from_secs(5),
            ..ToolSettings::default()
        };
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .settings(settings)
            .review_gate(Gate::new(Verdict::Stall))
            .build()
            .unwrap();
        let result = bridge
            .call("write_file", json!({"path": "s.txt", "content": "x"}))
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("review timed out"));
        assert!(fs.write_log().is_empty());
    }

    #[tokio::test]
    async fn accepted_review_notifies_with_stats() {
        let fs = Arc::new(MemoryFs::new());
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .review_gate(Gate::new(Verdict::Accept))
            .notifier(Arc::new(notifier))
            .build()
            .unwrap();
        bridge
            .call("write_file", json!({"path": "n.txt", "content": "1\n2\n"}))
            .await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update.path.as_str(), "/srv/app/n.txt");
        assert_eq!(update.old_content, None);
        assert_eq!((update.additions, update.deletions), (2, 0));
    }

    #[tokio::test]
    async fn glob_lists_sorted_remote_paths() {
        let fs = Arc::new(MemoryFs::new());
        for p in ["/srv/app/src/b.rs", "/srv/app/src/a.rs", "/srv/app/README.md"] {
            fs.insert(&path(p), "");
        }
        let bridge = bridge(&fs);
        let result = bridge.call("glob", json!({"pattern": "**/*.rs"})).await;
        assert_eq!(result.output, "/srv/app/src/a.rs\n/srv/app/src/b.rs");

        let none = bridge.call("glob", json!({"pattern": "*.toml"})).await;
        assert!(!none.is_error);
        assert_eq!(none.output, "No files match pattern: *.toml");

        let bad = bridge.call("glob", json!({"pattern": "src/["})).await;
        assert!(bad.is_error);
    }

    #[tokio::test]
    async fn glob_reports_truncation() {
        let fs = Arc::new(MemoryFs::new());
        for i in 0..5 {
            fs.insert(&path(&format!("/srv/app/f{i}.txt")), "");
        }
        let settings = ToolSettings {
            glob_limit: 3,
            ..ToolSettings::default()
        };
        let bridge = Bridge::builder(resolver(), fs.clone(), Echo::new(0))
            .settings(settings)
            .build()
            .unwrap();
        let result = bridge.call("glob", json!({"pattern": "*.txt"})).await;
        assert!(result.output.ends_with("[truncated at 3 matches]"));
        assert_eq!(result.output.lines().filter(|l| l.ends_with(".txt")).count(), 3);
    }

    #[tokio::test]
    async fn bash_defaults_cwd_and_clamps_timeout() {
        let fs = Arc::new(MemoryFs::new());
        let exec = Echo::new(0);
        let bridge = Bridge::builder(resolver(), fs, exec.clone()).build().unwrap();
        let result = bridge
            .call("bash", json!({"command": "ls", "timeout_ms": 9_000_000}))
            .await;
        assert_eq!(result.output, "ran ls\n");
        let seen = exec.seen.lock().unwrap().clone();
        assert_eq!(seen[0].1, Some(path("/srv/app")));
        assert_eq!(seen[0].2, Duration::from_secs(600));

        let empty = bridge.call("bash", json!({"command": "true"})).await;
        assert_eq!(empty.output, "(no output, exit code 0)");
    }

    #[tokio::test]
    async fn bash_nonzero_exit_is_an_error_result() {
        let fs = Arc::new(MemoryFs::new());
        let bridge = Bridge::builder(resolver(), fs, Echo::new(3)).build().unwrap();
        let result = bridge.call("bash", json!({"command": "make"})).await;
        assert!(result.is_error);
        assert_eq!(result.output, "ran make\n[exit code 3]");
    }

    #[tokio::test]
    async fn clear_state_drops_cache_and_overrides() {
        let fs = Arc::new(MemoryFs::lagging());
        let bridge = bridge(&fs);
        bridge
            .call("write_file", json!({"path": "k.txt", "content": "cached"}))
            .await;
        bridge.set_override("k.txt", "pending");
        bridge.clear_state();
        let read = bridge.call("read_file", json!({"path": "k.txt"})).await;
        assert!(read.is_error);
        bridge
            .call("write_file", json!({"path": "k.txt", "content": "agent"}))
            .await;
        assert_eq!(fs.latest(&path("/srv/app/k.txt")).unwrap(), b"agent");
    }
}
