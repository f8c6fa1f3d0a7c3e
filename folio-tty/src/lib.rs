use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use folio_core::{Command, InteractionMode, PointerEvent, RenderImage, ViewerConfig};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

mod layout;

pub use layout::{Placement, ScreenLayout};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl From<&Placement> for DrawParams {
    fn from(placement: &Placement) -> Self {
        Self::clamped(placement.columns, placement.rows)
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` as PNG and places it at the cursor, replacing the previous frame.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        trace!(bytes = encoded.len(), "transmitting frame");
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    u8::from(more)
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", u8::from(more))?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes the current frame and frees its image data.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Free-text prompts typed into the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Locate,
    Note,
}

impl PromptKind {
    fn sigil(self) -> char {
        match self {
            PromptKind::Locate => '/',
            PromptKind::Note => '>',
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    Pointer(PointerEvent),
    BeginPrompt(PromptKind),
    PromptChanged { kind: PromptKind, input: String },
    PromptSubmit { kind: PromptKind, input: String },
    PromptCancel,
    Ask,
    Export,
    RemoveLastNote,
    ResetSession,
    Resize,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt(PromptKind),
}

#[derive(Debug)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    prompt_buffer: String,
    zoom_step: f32,
    layout: ScreenLayout,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self::with_zoom_step(ViewerConfig::default().zoom_step)
    }
}

impl EventMapper {
    /// Container pixels scrolled per key press.
    pub const SCROLL_STEP: f32 = 80.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom_step(zoom_step: f32) -> Self {
        Self {
            pending_count: None,
            pending_digits: String::new(),
            mode: InputMode::Normal,
            prompt_buffer: String::new(),
            zoom_step: zoom_step.max(1.0 + f32::EPSILON),
            layout: ScreenLayout::from_window(80, 24, 0, 0),
        }
    }

    /// Geometry used to turn mouse cells into client-space pixels.
    pub fn set_layout(&mut self, layout: ScreenLayout) {
        self.layout = layout;
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.prompt_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Resize(..) => return UiEvent::Resize,
            Event::Mouse(mouse) => return self.map_mouse(mouse),
            _ => {}
        }
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Prompt(kind) => self.map_event_prompt(kind, event),
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let position = self.layout.cell_center(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => UiEvent::Pointer(PointerEvent::down(position)),
            MouseEventKind::Drag(MouseButton::Left) => {
                UiEvent::Pointer(PointerEvent::moved(position))
            }
            MouseEventKind::Up(MouseButton::Left) => UiEvent::Pointer(PointerEvent::up(position)),
            MouseEventKind::ScrollDown => UiEvent::Command(Command::ScrollBy {
                dx: 0.0,
                dy: Self::SCROLL_STEP,
            }),
            MouseEventKind::ScrollUp => UiEvent::Command(Command::ScrollBy {
                dx: 0.0,
                dy: -Self::SCROLL_STEP,
            }),
            _ => UiEvent::None,
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Left, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll(-Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Right, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll(Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll(0.0, -Self::SCROLL_STEP)
            }
            (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll(0.0, Self::SCROLL_STEP)
            }
            (KeyCode::Char('H'), KeyModifiers::SHIFT) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
                self.scroll(-Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Char('L'), KeyModifiers::SHIFT) | (KeyCode::Char('l'), KeyModifiers::NONE) => {
                self.scroll(Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Char('K'), KeyModifiers::SHIFT) => self.scroll(0.0, -Self::SCROLL_STEP),
            (KeyCode::Char('J'), KeyModifiers::SHIFT) => self.scroll(0.0, Self::SCROLL_STEP),
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE)
            | (KeyCode::PageDown, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.pending_count.take().map_or(0, |page| page.saturating_sub(1));
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page: usize::MAX })
            }
            (KeyCode::Char('+'), _) => self.command(Command::ScaleBy {
                factor: self.zoom_step,
            }),
            (KeyCode::Char('-'), _) => self.command(Command::ScaleBy {
                factor: 1.0 / self.zoom_step,
            }),
            (KeyCode::Char('='), _) => self.command(Command::ResetScale),
            (KeyCode::Char('d'), _) => self.command(Command::CycleTheme),
            (KeyCode::Char('t'), KeyModifiers::NONE) => self.command(Command::SetMode {
                mode: InteractionMode::TextSelect,
            }),
            (KeyCode::Char('b'), KeyModifiers::NONE) => self.command(Command::SetMode {
                mode: InteractionMode::BoxSelect,
            }),
            (KeyCode::Char('m'), KeyModifiers::NONE) => self.command(Command::SetMode {
                mode: InteractionMode::MaskPaint,
            }),
            (KeyCode::Char('c'), KeyModifiers::NONE) => self.command(Command::ClearMask),
            (KeyCode::Esc, _) => self.command(Command::ClearSelection),
            (KeyCode::Char('r'), KeyModifiers::NONE) => self.command(Command::Retry),
            (KeyCode::Char('R'), _) => {
                self.reset_count();
                UiEvent::ResetSession
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Ask
            }
            (KeyCode::Char('e'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Export
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::RemoveLastNote
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Locate),
            (KeyCode::Char('n'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Note),
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_prompt(&mut self, kind: PromptKind, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::PromptCancel
            }
            (KeyCode::Enter, _) => {
                let input = std::mem::take(&mut self.prompt_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::PromptSubmit { kind, input }
            }
            (KeyCode::Backspace, _) => {
                self.prompt_buffer.pop();
                UiEvent::PromptChanged {
                    kind,
                    input: self.prompt_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.prompt_buffer.push(c);
                UiEvent::PromptChanged {
                    kind,
                    input: self.prompt_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn command(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn begin_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::BeginPrompt(kind)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn scroll(&mut self, dx: f32, dy: f32) -> UiEvent {
        let multiplier = self.take_count() as f32;
        UiEvent::Command(Command::ScrollBy {
            dx: dx * multiplier,
            dy: dy * multiplier,
        })
    }

    /// Partially typed input for the status line: a count prefix or an open prompt.
    pub fn pending_input(&self) -> Option<String> {
        if let InputMode::Prompt(kind) = self.mode {
            return Some(format!("{}{}", kind.sigil(), self.prompt_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
