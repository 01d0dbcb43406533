//! In-memory fakes for the transport, process and web seams.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigStore, Settings};
use crate::executor::http::WebClient;
use crate::executor::process::{ProcessOutput, ProcessRunner};
use crate::executor::{ActionExecutor, Runtime};
use crate::sources::{Button, Inbound, Keyboard, Outbox, Transport};

pub(crate) const CHAT: i64 = 4242;

#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(i64, String, Keyboard)>>,
    documents: Mutex<Vec<PathBuf>>,
    commands: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t, _)| t.clone()).collect()
    }

    pub fn keyboards(&self) -> Vec<Keyboard> {
        self.sent.lock().unwrap().iter().map(|(_, _, k)| k.clone()).collect()
    }

    pub fn last_keyboard(&self) -> Keyboard {
        self.keyboards().pop().unwrap_or_default()
    }

    pub fn documents(&self) -> Vec<PathBuf> {
        self.documents.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn start(&self, _sender: Sender<Inbound>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { cancel.cancelled().await })
    }

    async fn send(&self, chat_id: i64, text: &str, keyboard: &[Vec<Button>]) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard.to_vec()));
        Ok(())
    }

    async fn send_document(&self, _chat_id: i64, path: &Path) -> anyhow::Result<()> {
        self.documents.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn announce_commands(&self, commands: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut recorded = self.commands.lock().unwrap();
        recorded.extend(commands.iter().map(|(verb, _)| verb.to_string()));
        Ok(())
    }
}

/// Records every invocation; answers with scripted outputs matched by
/// command prefix, or a silent success.
#[derive(Default)]
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<String>>,
    scripted: Mutex<Vec<(String, ProcessOutput)>>,
}

impl FakeRunner {
    pub fn respond(&self, prefix: &str, output: ProcessOutput) {
        self.scripted.lock().unwrap().push((prefix.to_string(), output));
    }

    pub fn fail(&self, prefix: &str, stderr: &str) {
        self.respond(
            prefix,
            ProcessOutput {
                code: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Every call as one line; shell calls are prefixed with `sh: `.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, line: String) -> ProcessOutput {
        let output = self
            .scripted
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(line);
        output
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, argv: &[&str]) -> std::io::Result<ProcessOutput> {
        Ok(self.answer(argv.join(" ")))
    }

    async fn run_shell(&self, command: &str) -> std::io::Result<ProcessOutput> {
        Ok(self.answer(format!("sh: {command}")))
    }
}

pub(crate) struct FakeWebClient {
    requests: Mutex<Vec<(String, String, Option<Value>)>>,
    status: Mutex<u16>,
}

impl Default for FakeWebClient {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            status: Mutex::new(200),
        }
    }
}

impl FakeWebClient {
    pub fn set_status(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    pub fn requests(&self) -> Vec<(String, String, Option<Value>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebClient for FakeWebClient {
    async fn request(&self, method: &str, url: &str, body: Option<&Value>) -> anyhow::Result<u16> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), url.to_string(), body.cloned()));
        Ok(*self.status.lock().unwrap())
    }
}

/// Settings rooted in a temporary directory plus all fakes wired together.
pub(crate) struct Harness {
    pub dir: TempDir,
    pub settings: Arc<Settings>,
    pub config: ConfigStore,
    pub transport: Arc<RecordingTransport>,
    pub runner: Arc<FakeRunner>,
    pub web: Arc<FakeWebClient>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let mut settings = Settings::new("test-token", CHAT);
        settings.webhook_file = root.join("webhooks.toml");
        settings.schedule_file = root.join("schedules.toml");
        settings.handshake_dir = root.join("handshakes");
        settings.log_path = root.join("pwnagotchi.log");
        settings.plugin_dirs = vec![root.join("plugins")];
        settings.backup_paths = vec![root.join("settings.yaml"), root.join("missing")];
        settings.backup_dir = root.join("backups");
        std::fs::create_dir_all(&settings.handshake_dir).unwrap();
        std::fs::create_dir_all(&settings.backup_dir).unwrap();
        std::fs::create_dir_all(root.join("plugins")).unwrap();
        let config = ConfigStore::new(root.join("config.toml"));
        Self {
            dir,
            settings: Arc::new(settings),
            config,
            transport: Arc::new(RecordingTransport::default()),
            runner: Arc::new(FakeRunner::default()),
            web: Arc::new(FakeWebClient::default()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.transport.clone(), CHAT, self.settings.max_message_len)
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(
            self.settings.clone(),
            self.config.clone(),
            self.outbox(),
            self.runner.clone(),
            self.web.clone(),
        )
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.settings.clone(), self.config.clone(), self.outbox(), Arc::new(self.executor()))
    }
}
