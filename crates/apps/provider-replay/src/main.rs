use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use web3_provider::{
    AsyncDispatch, Deferred, EthereumProvider, JsonRpcRequest, JsonRpcResponse, LegacyCallback,
    LegacyPayload, MemoryBridge, ProviderConfig, ProviderError, RequestArguments, RequestReply,
    StateStore, ACCOUNTS_CHANGED,
};

#[derive(Parser, Debug)]
#[command(
    name = "provider-replay",
    about = "Replay caller calls and host messages through a web3 provider",
    version
)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    network_id: Option<u64>,

    #[arg(long)]
    account: Option<String>,

    /// Turn on the provider's call tracing.
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    verbose: bool,

    /// Report failures as a JSON envelope.
    #[arg(long)]
    json: bool,

    /// JSON-lines transcript; stdin when absent or `-`.
    transcript: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "call", rename_all = "snake_case")]
enum Call {
    Enable,
    Request {
        #[serde(default)]
        args: Option<JsonValue>,
    },
    Send {
        method: String,
        #[serde(default)]
        params: Option<JsonValue>,
    },
    SendSync {
        payload: JsonRpcRequest,
    },
    SendAsync {
        #[serde(default)]
        payload: Option<LegacyPayload>,
    },
    ScanQrCode {
        regex: String,
    },
    ContactCode,
}

#[derive(Debug)]
enum Line {
    Call(Call),
    Inbound(JsonValue),
}

fn parse_line(raw: &str) -> Result<Option<Line>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let mut value: JsonValue = serde_json::from_str(trimmed).context("line is not JSON")?;
    if let Some(inbound) = value.get_mut("inbound") {
        return Ok(Some(Line::Inbound(inbound.take())));
    }
    let call = serde_json::from_value(value).context("unrecognized call")?;
    Ok(Some(Line::Call(call)))
}

/// Drives one provider through a transcript and collects the JSON lines it reports.
struct Replay {
    provider: EthereumProvider,
    bridge: MemoryBridge,
    output: Rc<RefCell<Vec<JsonValue>>>,
    open_callbacks: Rc<RefCell<BTreeSet<usize>>>,
    waiting: Vec<(usize, Deferred)>,
    calls: usize,
}

impl Replay {
    fn new(state: StateStore) -> Self {
        let bridge = MemoryBridge::new();
        let provider = EthereumProvider::new(Rc::new(bridge.clone()), state);
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);
        provider.on(
            ACCOUNTS_CHANGED,
            Rc::new(move |data: &JsonValue| {
                sink.borrow_mut().push(json!({ "event": ACCOUNTS_CHANGED, "data": data }));
            }),
        );
        Self {
            provider,
            bridge,
            output,
            open_callbacks: Rc::new(RefCell::new(BTreeSet::new())),
            waiting: Vec::new(),
            calls: 0,
        }
    }

    fn step(&mut self, line: Line) -> Result<()> {
        match line {
            Line::Inbound(message) => {
                let outcome = self
                    .provider
                    .on_message(&message.to_string())
                    .map_err(|err| anyhow!("inbound message rejected: {err}"))?;
                debug!("inbound routed: {outcome:?}");
            }
            Line::Call(call) => {
                self.calls += 1;
                let number = self.calls;
                self.call(number, call);
            }
        }
        self.flush_outbound()?;
        self.collect_settled();
        Ok(())
    }

    fn call(&mut self, number: usize, call: Call) {
        match call {
            Call::Enable => {
                let deferred = self.provider.enable();
                self.wait(number, deferred);
            }
            Call::Request { args } => {
                let reply = match args.map(RequestArguments::from_value).transpose() {
                    Ok(args) => self.provider.request(args),
                    Err(err) => Err(err),
                };
                match reply {
                    Ok(RequestReply::Deferred(deferred)) => self.wait(number, deferred),
                    Ok(RequestReply::Sync(response)) => self.returned(number, &response),
                    Err(err) => self.failed(number, &err),
                }
            }
            Call::Send { method, params } => match self.provider.send(&method, params) {
                Ok(reply) => self.wait(number, reply.into_deferred()),
                Err(err) => self.failed(number, &err),
            },
            Call::SendSync { payload } => {
                let response = self.provider.send_sync(payload);
                self.returned(number, &response);
            }
            Call::SendAsync { payload } => {
                let callback = self.legacy_callback(number);
                match self.provider.send_async(payload, Some(callback)) {
                    Ok(AsyncDispatch::Permission(deferred)) => {
                        self.open_callbacks.borrow_mut().remove(&number);
                        self.wait(number, deferred);
                    }
                    Ok(AsyncDispatch::Answered | AsyncDispatch::Dispatched(_)) => {}
                    Err(err) => {
                        self.open_callbacks.borrow_mut().remove(&number);
                        self.failed(number, &err);
                    }
                }
            }
            Call::ScanQrCode { regex } => match self.provider.scan_qr_code(&regex) {
                Ok(deferred) => self.wait(number, deferred),
                Err(err) => self.failed(number, &err),
            },
            Call::ContactCode => {
                let deferred = self.provider.status().get_contact_code();
                self.wait(number, deferred);
            }
        }
    }

    fn legacy_callback(&self, number: usize) -> LegacyCallback {
        self.open_callbacks.borrow_mut().insert(number);
        let open = Rc::clone(&self.open_callbacks);
        let sink = Rc::clone(&self.output);
        Box::new(move |error, result| {
            open.borrow_mut().remove(&number);
            let report = json!({ "error": error, "result": result });
            sink.borrow_mut().push(json!({ "call": number, "callback": report }));
        })
    }

    fn wait(&mut self, number: usize, deferred: Deferred) {
        self.waiting.push((number, deferred));
    }

    fn returned(&self, number: usize, response: &JsonRpcResponse) {
        self.output.borrow_mut().push(json!({ "call": number, "returned": response.to_value() }));
    }

    fn failed(&self, number: usize, err: &ProviderError) {
        self.output.borrow_mut().push(json!({ "call": number, "settled": { "error": err } }));
    }

    fn flush_outbound(&self) -> Result<()> {
        for raw in self.bridge.drain() {
            let envelope: JsonValue =
                serde_json::from_str(&raw).context("provider posted invalid JSON")?;
            self.output.borrow_mut().push(json!({ "outbound": envelope }));
        }
        Ok(())
    }

    fn collect_settled(&mut self) {
        let mut still_waiting = Vec::with_capacity(self.waiting.len());
        for (number, mut deferred) in self.waiting.drain(..) {
            match deferred.try_take() {
                Some(Ok(value)) => self
                    .output
                    .borrow_mut()
                    .push(json!({ "call": number, "settled": { "ok": value } })),
                Some(Err(err)) => self
                    .output
                    .borrow_mut()
                    .push(json!({ "call": number, "settled": { "error": err } })),
                None => still_waiting.push((number, deferred)),
            }
        }
        self.waiting = still_waiting;
    }

    fn pending(&self) -> Vec<usize> {
        let mut pending = self.waiting.iter().map(|(number, _)| *number).collect::<Vec<_>>();
        pending.extend(self.open_callbacks.borrow().iter().copied());
        pending.sort_unstable();
        pending
    }

    fn take_output(&self) -> Vec<JsonValue> {
        std::mem::take(&mut *self.output.borrow_mut())
    }
}

fn load_state(cli: &Cli) -> Result<StateStore> {
    let mut config = match &cli.config {
        Some(path) => ProviderConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    if let Some(network_id) = cli.network_id {
        if network_id == 0 {
            return Err(anyhow!("--network-id must be greater than zero"));
        }
        config.provider.network_id = network_id;
    }
    if let Some(account) = &cli.account {
        config.provider.account = Some(account.clone());
    }
    if cli.debug {
        config.provider.debug = true;
    }
    config.provider.validate().map_err(|err| anyhow!("invalid provider settings: {err}"))?;
    Ok(StateStore::from_config(&config))
}

fn replay(state: StateStore, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    let mut session = Replay::new(state);
    for (index, raw) in input.lines().enumerate() {
        let number = index + 1;
        let raw = raw.with_context(|| format!("failed to read transcript line {number}"))?;
        let Some(line) = parse_line(&raw).with_context(|| format!("transcript line {number}"))?
        else {
            continue;
        };
        session.step(line).with_context(|| format!("transcript line {number}"))?;
        for value in session.take_output() {
            writeln!(out, "{value}")?;
        }
    }
    writeln!(out, "{}", json!({ "pending": session.pending() }))?;
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let state = load_state(cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.transcript {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path)
                .with_context(|| format!("failed to open transcript {}", path.display()))?;
            replay(state, BufReader::new(file), &mut out)
        }
        _ => replay(state, io::stdin().lock(), &mut out),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.json {
                eprintln!("{}", json!({ "ok": false, "error": format!("{err:#}") }));
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(1)
        }
    }
}
