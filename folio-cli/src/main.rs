use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use folio_core::{
    CompletionRequest, CompletionService, PointerPhase, Point, Size, ViewerConfig, ViewerEvent,
    ViewportController,
};
use folio_render::{export, present};
use folio_tty::{
    write_status_line, DrawParams, EventMapper, KittyRenderer, PromptKind, ScreenLayout, UiEvent,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod completion;

use completion::CommandCompletion;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "kitty-native document viewer with selections, notes and answer focusing"
)]
struct Args {
    /// Page to open on (0-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Configuration file; defaults to config.toml in the platform config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// PDF or image to open
    file: PathBuf,
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ViewerConfig::load_or_default(&config_path)?;
    info!(path = %config_path.display(), "loaded configuration");

    let provider = folio_render::provider_for(&args.file)?;
    let backend = provider
        .open(&args.file)
        .await
        .with_context(|| format!("failed to open {}", args.file.display()))?;

    let data_dir = project_dirs.data_local_dir().to_path_buf();
    let completion: Option<Arc<dyn CompletionService>> = match &config.completion.command {
        Some(argv) => Some(Arc::new(CommandCompletion::new(
            argv.clone(),
            data_dir.join("regions"),
        )?)),
        None => None,
    };
    let mapper = EventMapper::with_zoom_step(config.zoom_step);

    let mut controller = ViewportController::new(backend, config);
    controller.open_at(args.page.unwrap_or(0));

    let _terminal = TerminalGuard::new()?;
    let mut app = App::new(controller, mapper, completion, data_dir.join("exports"));
    let result = app.run().await;

    app.renderer.delete_image()?;
    app.renderer.clear_all()?;
    result
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct App {
    controller: ViewportController,
    mapper: EventMapper,
    renderer: KittyRenderer<io::Stdout>,
    completion: Option<Arc<dyn CompletionService>>,
    answers_tx: mpsc::UnboundedSender<Result<String>>,
    answers_rx: mpsc::UnboundedReceiver<Result<String>>,
    pending_answers: usize,
    clipboard: Option<arboard::Clipboard>,
    export_dir: PathBuf,
    quote: Option<String>,
    last_pointer: Option<Point>,
    message: Option<String>,
}

impl App {
    fn new(
        controller: ViewportController,
        mapper: EventMapper,
        completion: Option<Arc<dyn CompletionService>>,
        export_dir: PathBuf,
    ) -> Self {
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();
        let clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                warn!(%err, "clipboard unavailable");
                None
            }
        };
        Self {
            controller,
            mapper,
            renderer: KittyRenderer::new(io::stdout()),
            completion,
            answers_tx,
            answers_rx,
            pending_answers: 0,
            clipboard,
            export_dir,
            quote: None,
            last_pointer: None,
            message: None,
        }
    }

    async fn run(&mut self) -> Result<()> {
        let mut dirty = true;
        loop {
            dirty |= self.controller.pump();
            dirty |= self.handle_viewer_events();
            dirty |= self.collect_answers();

            if dirty {
                self.redraw()?;
                dirty = false;
            }

            if event::poll(POLL_INTERVAL)? {
                let ui_event = self.mapper.map_event(event::read()?);
                match self.handle_event(ui_event)? {
                    LoopAction::ContinueRedraw => dirty = true,
                    LoopAction::Continue => {}
                    LoopAction::Quit => break,
                }
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: UiEvent) -> Result<LoopAction> {
        match event {
            UiEvent::Command(command) => {
                let changed = self.controller.apply(command);
                Ok(if changed {
                    LoopAction::ContinueRedraw
                } else {
                    LoopAction::Continue
                })
            }
            UiEvent::Pointer(pointer) => {
                if pointer.phase == PointerPhase::Down {
                    self.last_pointer = Some(pointer.position);
                }
                self.controller.pointer(pointer);
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::BeginPrompt(_) | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => {
                self.draw_status(&current_layout()?)?;
                Ok(LoopAction::Continue)
            }
            UiEvent::PromptSubmit { kind, input } => {
                self.submit_prompt(kind, input.trim());
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Ask => {
                self.start_ask();
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Export => {
                self.export()?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::RemoveLastNote => {
                let last = self.controller.annotations().last().map(|note| note.id);
                if let Some(id) = last {
                    self.controller.remove_annotation(id);
                    self.message = Some("note removed".into());
                }
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::ResetSession => {
                self.controller.reset_session();
                self.quote = None;
                self.message = Some("session cleared".into());
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Resize => Ok(LoopAction::ContinueRedraw),
            UiEvent::Quit => Ok(LoopAction::Quit),
            UiEvent::None => Ok(LoopAction::Continue),
        }
    }

    fn submit_prompt(&mut self, kind: PromptKind, input: &str) {
        if input.is_empty() {
            return;
        }
        match kind {
            PromptKind::Locate => {
                let result = self.controller.locate(input);
                self.message = Some(if result.found {
                    format!("found \"{}\"", input)
                } else {
                    format!("\"{}\" is not on this page", input)
                });
            }
            PromptKind::Note => {
                let anchor = self
                    .last_pointer
                    .unwrap_or_else(|| self.controller.container().bounds.center());
                self.message = Some(match self.controller.add_annotation(anchor, input) {
                    Some(_) => format!("note {} added", self.controller.annotations().len()),
                    None => "click on the page to place a note".into(),
                });
            }
        }
    }

    fn start_ask(&mut self) {
        let Some(service) = self.completion.clone() else {
            self.message = Some("no completion command configured".into());
            return;
        };
        let request = self.controller.region_request().or_else(|| {
            self.quote
                .clone()
                .map(|text| CompletionRequest::Quote { text })
        });
        let Some(request) = request else {
            self.message = Some("select text or a region first".into());
            return;
        };

        info!(kind = request.kind(), "asking completion service");
        self.pending_answers += 1;
        let sender = self.answers_tx.clone();
        tokio::spawn(async move {
            let answer = service.ask(request).await;
            let _ = sender.send(answer);
        });
    }

    fn collect_answers(&mut self) -> bool {
        let mut changed = false;
        while let Ok(answer) = self.answers_rx.try_recv() {
            self.pending_answers = self.pending_answers.saturating_sub(1);
            changed = true;
            match answer {
                Ok(answer) => {
                    let focus = self.controller.focus_answer(&answer);
                    let summary = first_line(&answer);
                    self.message = Some(if focus.found {
                        summary
                    } else {
                        format!("{summary} (no quoted passage on this page)")
                    });
                }
                Err(err) => {
                    warn!(?err, "completion failed");
                    self.message = Some(format!("completion failed: {err}"));
                }
            }
        }
        changed
    }

    fn handle_viewer_events(&mut self) -> bool {
        let events = self.controller.drain_events();
        let changed = !events.is_empty();
        for event in events {
            match event {
                ViewerEvent::TextSelected { text, .. } => {
                    self.copy_to_clipboard(&text);
                    self.message = Some(format!("selected {} chars", text.chars().count()));
                    self.quote = Some(text);
                }
                ViewerEvent::ReferenceRequested(text) => {
                    self.message = Some(format!("reference {text}: press a to ask"));
                    self.quote = Some(text);
                }
                ViewerEvent::RegionSelected(region) => {
                    self.message = Some(format!(
                        "region {:.0}x{:.0} selected: press a to ask",
                        region.width, region.height
                    ));
                }
                ViewerEvent::MaskUpdated => {
                    let strokes = self.controller.surface().strokes().len();
                    self.message = Some(format!("mask: {strokes} strokes"));
                }
                ViewerEvent::RenderError(error) => {
                    self.message = Some(format!("render failed: {error} (r to retry)"));
                }
                ViewerEvent::HighlightNotFound => {
                    self.message = Some("passage not found on this page".into());
                }
            }
        }
        changed
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        if let Some(clipboard) = self.clipboard.as_mut() {
            if let Err(err) = clipboard.set_text(text.to_owned()) {
                warn!(%err, "failed to copy selection");
            }
        }
    }

    fn export(&mut self) -> Result<()> {
        let Some(snapshot) = self.controller.snapshot() else {
            self.message = Some("nothing rendered yet".into());
            return Ok(());
        };
        fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("failed to create {}", self.export_dir.display()))?;
        let stem = self
            .controller
            .info()
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".into());
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let path = self
            .export_dir
            .join(format!("{stem}-p{}-{stamp}.png", snapshot.page.index + 1));

        self.message = Some(match export::export_png(&snapshot, &path) {
            Ok(()) => format!("exported {}", path.display()),
            Err(err) => {
                warn!(?err, "export failed");
                format!("export failed: {err}")
            }
        });
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let layout = current_layout()?;
        self.mapper.set_layout(layout);
        self.controller.observe_container(layout.page_area());
        let origin = layout.raster_origin(self.controller.surface().display_size());
        self.controller.set_raster_origin(origin);

        self.renderer.begin_sync_update()?;
        self.renderer.clear_all()?;
        match present::frame(&self.controller)? {
            Some(frame) => {
                let display = Size::new(frame.width as f32, frame.height as f32);
                self.controller.observe_raster_size(display);
                let scroll = self.controller.container().scroll;
                if let Some(placement) = layout.placement(origin, display, scroll) {
                    let visible = frame.crop(&placement.source);
                    {
                        let mut writer = self.renderer.writer();
                        crossterm::execute!(
                            &mut writer,
                            cursor::MoveTo(placement.column, placement.row)
                        )?;
                    }
                    self.renderer.draw(&visible, DrawParams::from(&placement))?;
                }
            }
            None => self.renderer.delete_image()?,
        }
        self.draw_status(&layout)?;
        self.renderer.end_sync_update()
    }

    fn draw_status(&mut self, layout: &ScreenLayout) -> Result<()> {
        let pending = self.mapper.pending_input();
        let status = truncate_with_ellipsis(
            format_status(
                &self.controller,
                self.pending_answers > 0,
                self.message.as_deref(),
                pending.as_deref(),
            ),
            usize::from(layout.columns),
        );
        let mut writer = self.renderer.writer();
        crossterm::execute!(
            &mut writer,
            cursor::MoveTo(0, layout.status_row()),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(&mut writer, &status)?;
        Ok(())
    }
}

fn current_layout() -> Result<ScreenLayout> {
    let window = terminal::window_size()?;
    Ok(ScreenLayout::from_window(
        window.columns,
        window.rows,
        window.width,
        window.height,
    ))
}

fn format_status(
    controller: &ViewportController,
    asking: bool,
    message: Option<&str>,
    pending_input: Option<&str>,
) -> String {
    let info = controller.info();
    let title = info
        .metadata
        .title
        .clone()
        .filter(|title| !title.trim().is_empty())
        .or_else(|| {
            info.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "untitled".into());

    let mut parts = vec![
        title,
        format!(
            "{}/{}",
            controller.page_index() + 1,
            controller.page_count().max(1)
        ),
        format!("{:.0}%", controller.scale() * 100.0),
        controller.theme().label().to_string(),
        controller.mode().label().to_string(),
    ];
    let notes = controller.annotations().len();
    if notes > 0 {
        parts.push(format!("{notes} notes"));
    }
    if controller.is_rendering() {
        parts.push("rendering".into());
    }
    if asking {
        parts.push("asking".into());
    }
    if let Some(message) = message.filter(|message| !message.is_empty()) {
        parts.push(message.to_string());
    }
    if let Some(pending) = pending_input.filter(|pending| !pending.is_empty()) {
        parts.push(pending.to_string());
    }
    parts.join(" | ")
}

fn first_line(answer: &str) -> String {
    answer
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("(empty answer)")
        .to_string()
}

fn truncate_with_ellipsis(mut text: String, width: usize) -> String {
    if text.chars().count() <= width {
        return text;
    }
    if width == 0 {
        return String::new();
    }
    let keep = if width >= 3 { width - 3 } else { width };
    let cut = text
        .char_indices()
        .nth(keep)
        .map_or(text.len(), |(index, _)| index);
    text.truncate(cut);
    if width >= 3 {
        text.push_str("...");
    }
    text
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_terminal_width() {
        assert_eq!(truncate_with_ellipsis("short".into(), 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij".into(), 6), "abc...");
        assert_eq!(truncate_with_ellipsis("abcdef".into(), 2), "ab");
        assert_eq!(truncate_with_ellipsis("ééééé".into(), 4), "é...");
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(first_line("\n\n  The bound is tight.\nMore."), "The bound is tight.");
        assert_eq!(first_line("   "), "(empty answer)");
    }
}
