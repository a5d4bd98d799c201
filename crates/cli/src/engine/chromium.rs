//! Headless Chromium engine over the DevTools protocol.
//!
//! The session core is synchronous and single-threaded, so the async CDP
//! client lives on its own thread with a current-thread runtime. Trait
//! calls cross over as commands with blocking replies; CDP events stream
//! back through the session's engine channel.

use std::sync::mpsc as std_mpsc;
use std::thread;

use anyhow::Context;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::network::{
	self, CookieParam, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, SetCookiesParams,
	TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
	self as page_api, AddScriptToEvaluateOnNewDocumentParams, EventFrameStartedLoading, EventJavascriptDialogOpening,
	HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
	self, AddBindingParams, EventBindingCalled, EventConsoleApiCalled, EventExecutionContextCreated, RemoteObject,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use loadwatch::{
	CookieSpec, EngineEvent, EngineEventSender, Error, LoadStatus, PageEngine, ResourceRequest, ResourceResponse,
	Result, SCOPE_BINDING, ScopeMessage, Viewport,
};

type Reply<T> = std_mpsc::Sender<std::result::Result<T, String>>;

enum Cmd {
	SetViewport(Viewport, Reply<()>),
	SetUserAgent(String, Reply<()>),
	AddCookie(CookieSpec, Reply<()>),
	InjectJs(String, Reply<bool>),
	Open(String, Reply<()>),
	Evaluate(String, Reply<Value>),
	PageContent(Reply<String>),
	Close(Reply<()>),
}

/// A headless Chromium page driven over CDP.
pub struct ChromiumEngine {
	cmd_tx: mpsc::UnboundedSender<Cmd>,
	thread: Option<thread::JoinHandle<()>>,
}

impl ChromiumEngine {
	/// Launches the browser and blocks until the page is ready for commands.
	pub fn launch(events: EngineEventSender) -> Result<Self> {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (ready_tx, ready_rx) = std_mpsc::channel();

		let handle = thread::Builder::new()
			.name("lw-engine".to_string())
			.spawn(move || {
				let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
					Ok(runtime) => runtime,
					Err(err) => {
						let _ = ready_tx.send(Err(err.to_string()));
						return;
					}
				};
				runtime.block_on(engine_main(cmd_rx, events, ready_tx));
			})
			.map_err(|err| Error::Engine(format!("failed to spawn engine thread: {err}")))?;

		match ready_rx.recv() {
			Ok(Ok(())) => Ok(Self { cmd_tx, thread: Some(handle) }),
			Ok(Err(message)) => Err(Error::Engine(message)),
			Err(_) => Err(Error::Engine("engine thread exited during startup".to_string())),
		}
	}

	fn command<T>(&self, build: impl FnOnce(Reply<T>) -> Cmd) -> Result<T> {
		let (reply_tx, reply_rx) = std_mpsc::channel();
		self.cmd_tx
			.send(build(reply_tx))
			.map_err(|_| Error::Engine("engine thread is gone".to_string()))?;
		match reply_rx.recv() {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(message)) => Err(Error::Engine(message)),
			Err(_) => Err(Error::Engine("engine dropped the reply".to_string())),
		}
	}
}

impl PageEngine for ChromiumEngine {
	fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
		self.command(|reply| Cmd::SetViewport(viewport, reply))
	}

	fn set_user_agent(&mut self, user_agent: &str) -> Result<()> {
		self.command(|reply| Cmd::SetUserAgent(user_agent.to_string(), reply))
	}

	fn add_cookie(&mut self, cookie: &CookieSpec) -> Result<()> {
		let cookie = cookie.clone();
		self.command(|reply| Cmd::AddCookie(cookie, reply))
	}

	fn inject_js(&mut self, source: &str) -> Result<bool> {
		self.command(|reply| Cmd::InjectJs(source.to_string(), reply))
	}

	fn open(&mut self, url: &str) -> Result<()> {
		self.command(|reply| Cmd::Open(url.to_string(), reply))
	}

	fn evaluate(&mut self, script: &str) -> Result<Value> {
		self.command(|reply| Cmd::Evaluate(script.to_string(), reply))
			.map_err(|err| match err {
				Error::Engine(message) => Error::Evaluate(message),
				other => other,
			})
	}

	fn page_content(&mut self) -> Result<String> {
		self.command(Cmd::PageContent)
	}

	fn close(&mut self) {
		let (reply_tx, reply_rx) = std_mpsc::channel();
		if self.cmd_tx.send(Cmd::Close(reply_tx)).is_ok() {
			let _ = reply_rx.recv();
		}
		if let Some(handle) = self.thread.take() {
			let _ = handle.join();
		}
	}
}

impl Drop for ChromiumEngine {
	fn drop(&mut self) {
		if self.thread.is_some() {
			self.close();
		}
	}
}

async fn engine_main(
	mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
	events: EngineEventSender,
	ready: std_mpsc::Sender<std::result::Result<(), String>>,
) {
	let (mut browser, page, driver) = match setup(&events).await {
		Ok(parts) => {
			let _ = ready.send(Ok(()));
			parts
		}
		Err(err) => {
			let _ = ready.send(Err(format!("{err:#}")));
			return;
		}
	};

	while let Some(cmd) = cmd_rx.recv().await {
		match cmd {
			Cmd::SetViewport(viewport, reply) => {
				let _ = reply.send(set_viewport(&page, viewport).await);
			}
			Cmd::SetUserAgent(user_agent, reply) => {
				let _ = reply.send(set_user_agent(&page, &user_agent).await);
			}
			Cmd::AddCookie(cookie, reply) => {
				let _ = reply.send(add_cookie(&page, &cookie).await);
			}
			Cmd::InjectJs(source, reply) => {
				let _ = reply.send(inject_js(&page, &source).await);
			}
			Cmd::Open(url, reply) => {
				let navigating = page.clone();
				let tx = events.clone();
				tokio::spawn(async move {
					let outcome = navigate(&navigating, &url).await;
					let status = match outcome {
						Ok(()) => LoadStatus::Success,
						Err(message) => LoadStatus::Failed(message),
					};
					tx.send(EngineEvent::LoadFinished(status));
				});
				let _ = reply.send(Ok(()));
			}
			Cmd::Evaluate(script, reply) => {
				let _ = reply.send(evaluate(&page, &script).await);
			}
			Cmd::PageContent(reply) => {
				let _ = reply.send(page.content().await.map_err(|err| err.to_string()));
			}
			Cmd::Close(reply) => {
				debug!(target: "lw.engine", "closing browser");
				if let Err(err) = browser.close().await {
					warn!(target: "lw.engine", error = %err, "browser close failed");
				}
				let _ = browser.wait().await;
				driver.abort();
				let _ = reply.send(Ok(()));
				break;
			}
		}
	}
}

async fn setup(events: &EngineEventSender) -> anyhow::Result<(Browser, Page, tokio::task::JoinHandle<()>)> {
	let config = BrowserConfig::builder().build().map_err(anyhow::Error::msg)?;
	let (browser, mut handler) = Browser::launch(config).await.context("launching headless browser")?;

	let driver = tokio::spawn(async move {
		while let Some(message) = handler.next().await {
			if message.is_err() {
				break;
			}
		}
	});

	let page = browser.new_page("about:blank").await.context("creating page")?;
	page.execute(network::EnableParams::default()).await.context("enabling network domain")?;
	page.execute(page_api::EnableParams::default()).await.context("enabling page domain")?;
	page.execute(runtime::EnableParams::default()).await.context("enabling runtime domain")?;

	let binding = AddBindingParams::builder()
		.name(SCOPE_BINDING)
		.build()
		.map_err(anyhow::Error::msg)?;
	page.execute(binding).await.context("registering scope binding")?;

	spawn_listeners(&page, events).await.context("attaching event listeners")?;

	Ok((browser, page, driver))
}

async fn spawn_listeners(page: &Page, events: &EngineEventSender) -> anyhow::Result<()> {
	let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		while let Some(event) = requests.next().await {
			tx.send(EngineEvent::ResourceRequested(ResourceRequest {
				id: event.request_id.inner().clone(),
				url: event.request.url.clone(),
				method: event.request.method.clone(),
			}));
		}
	});

	let mut responses = page.event_listener::<EventResponseReceived>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		while let Some(event) = responses.next().await {
			tx.send(EngineEvent::ResourceReceived(ResourceResponse {
				id: event.request_id.inner().clone(),
				url: event.response.url.clone(),
				status: event.response.status,
				content_type: Some(event.response.mime_type.clone()),
				body_size: event.response.encoded_data_length.max(0.0) as u64,
			}));
		}
	});

	// requests that die without a response still have to settle
	let mut failures = page.event_listener::<EventLoadingFailed>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		while let Some(event) = failures.next().await {
			tx.send(EngineEvent::ResourceReceived(ResourceResponse {
				id: event.request_id.inner().clone(),
				url: String::new(),
				status: 0,
				content_type: None,
				body_size: 0,
			}));
		}
	});

	let mut frames = page.event_listener::<EventFrameStartedLoading>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		let mut seen = false;
		while let Some(_event) = frames.next().await {
			if !seen {
				seen = true;
				tx.send(EngineEvent::LoadStarted);
			}
		}
	});

	let mut contexts = page.event_listener::<EventExecutionContextCreated>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		let mut seen = false;
		while let Some(_event) = contexts.next().await {
			if !seen {
				seen = true;
				tx.send(EngineEvent::PageInitialized);
			}
		}
	});

	let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		while let Some(event) = console.next().await {
			tx.send(EngineEvent::ConsoleMessage(console_text(&event.args)));
		}
	});

	let mut dialogs = page.event_listener::<EventJavascriptDialogOpening>().await?;
	let tx = events.clone();
	let dialog_page = page.clone();
	tokio::spawn(async move {
		while let Some(event) = dialogs.next().await {
			tx.send(EngineEvent::Alert(event.message.clone()));
			// the page blocks until the dialog is handled
			if let Ok(params) = HandleJavaScriptDialogParams::builder().accept(true).build() {
				let _ = dialog_page.execute(params).await;
			}
		}
	});

	let mut bindings = page.event_listener::<EventBindingCalled>().await?;
	let tx = events.clone();
	tokio::spawn(async move {
		while let Some(event) = bindings.next().await {
			if event.name != SCOPE_BINDING {
				continue;
			}
			match parse_scope_payload(&event.payload) {
				Some(message) => tx.send(EngineEvent::ScopeMessage(message)),
				None => warn!(target: "lw.engine", "discarding malformed scope payload"),
			}
		}
	});

	Ok(())
}

async fn navigate(page: &Page, url: &str) -> std::result::Result<(), String> {
	page.goto(url).await.map_err(|err| err.to_string())?;
	page.wait_for_navigation().await.map_err(|err| err.to_string())?;
	Ok(())
}

async fn set_viewport(page: &Page, viewport: Viewport) -> std::result::Result<(), String> {
	let params = SetDeviceMetricsOverrideParams::builder()
		.width(i64::from(viewport.width))
		.height(i64::from(viewport.height))
		.device_scale_factor(1.0)
		.mobile(false)
		.build()?;
	page.execute(params).await.map_err(|err| err.to_string())?;
	Ok(())
}

async fn set_user_agent(page: &Page, user_agent: &str) -> std::result::Result<(), String> {
	let params = SetUserAgentOverrideParams::builder().user_agent(user_agent).build()?;
	page.execute(params).await.map_err(|err| err.to_string())?;
	Ok(())
}

async fn add_cookie(page: &Page, cookie: &CookieSpec) -> std::result::Result<(), String> {
	let mut builder = CookieParam::builder().name(&cookie.name).value(&cookie.value);
	if let Some(domain) = &cookie.domain {
		builder = builder.domain(domain);
	}
	if let Some(path) = &cookie.path {
		builder = builder.path(path);
	}
	if cookie.secure {
		builder = builder.secure(true);
	}
	if cookie.http_only {
		builder = builder.http_only(true);
	}
	if let Some(expires) = cookie.expires {
		builder = builder.expires(TimeSinceEpoch::new(expires));
	}
	let param = builder.build()?;
	page.execute(SetCookiesParams::new(vec![param]))
		.await
		.map_err(|err| err.to_string())?;
	Ok(())
}

async fn inject_js(page: &Page, source: &str) -> std::result::Result<bool, String> {
	let params = AddScriptToEvaluateOnNewDocumentParams::builder().source(source).build()?;
	match page.execute(params).await {
		Ok(_) => Ok(true),
		Err(err) => {
			warn!(target: "lw.engine", error = %err, "script registration refused");
			Ok(false)
		}
	}
}

async fn evaluate(page: &Page, script: &str) -> std::result::Result<Value, String> {
	let result = page.evaluate(script.to_string()).await.map_err(|err| err.to_string())?;
	Ok(result.value().cloned().unwrap_or(Value::Null))
}

fn console_text(args: &[RemoteObject]) -> String {
	args.iter()
		.map(|arg| format_console_value(arg.value.as_ref(), arg.description.as_deref()))
		.collect::<Vec<_>>()
		.join(" ")
}

fn format_console_value(value: Option<&Value>, description: Option<&str>) -> String {
	match (value, description) {
		(Some(Value::String(text)), _) => text.clone(),
		(Some(other), _) => other.to_string(),
		(None, Some(description)) => description.to_string(),
		(None, None) => "undefined".to_string(),
	}
}

fn parse_scope_payload(payload: &str) -> Option<ScopeMessage> {
	let value: Value = serde_json::from_str(payload).ok()?;
	let kind = value.get("type")?.as_str()?.to_string();
	let data = value.get("data").cloned().unwrap_or(Value::Null);
	Some(ScopeMessage { kind, data })
}
