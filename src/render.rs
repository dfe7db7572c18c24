use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use eramorph::{Rgb, Surface};
use std::cmp::min;
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn get(&self, x: u16, y: u16) -> Option<Cell> {
        (x < self.w && y < self.h).then(|| self.cells[self.idx(x, y)])
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Color) {
        self.cells.fill(Cell {
            bg,
            ..Cell::default()
        });
    }
}

/// Braille sub-pixel canvas (2×4 dots per cell). Plots add light; nothing
/// is ever occluded.
pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    px: Vec<Rgb>,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Rgb::default(); (w as usize) * (h as usize)],
        }
    }
    fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn clear(&mut self) {
        self.px.fill(Rgb::default());
    }
    pub(crate) fn at(&self, x: u32, y: u32) -> Rgb {
        if x < self.w && y < self.h {
            self.px[self.idx(x, y)]
        } else {
            Rgb::default()
        }
    }
}

impl Surface for PixelCanvas {
    fn size(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    fn plot(&mut self, x: i32, y: i32, color: Rgb, intensity: f32) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.w || y >= self.h {
            return;
        }
        let i = self.idx(x, y);
        let d = self.px[i];
        let s = color.scale(intensity);
        self.px[i] = Rgb::new(d.r + s.r, d.g + s.g, d.b + s.b);
    }
}

/// Owns raw mode and the alternate screen until `end` or drop.
pub(crate) struct Terminal {
    out: io::Stdout,
    active: bool,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    pub(crate) canvas: PixelCanvas,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        let (w, h) = canvas_size(cols, rows);
        Ok(Self {
            out,
            active: true,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            canvas: PixelCanvas::new(w, h),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        let (w, h) = canvas_size(c, r);
        self.canvas = PixelCanvas::new(w, h);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    /// Writes only the cells that changed since the last frame.
    pub(crate) fn present(&mut self) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;
        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if c == self.prev.cells[i] {
                    continue;
                }
                queue!(self.out, cursor::MoveTo(x, y))?;
                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }
                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        // unwinding out of the frame loop must still hand the shell back
        let _ = self.end();
    }
}

/// Braille canvas size for a terminal of `cols` × `rows` cells.
pub(crate) fn canvas_size(cols: u16, rows: u16) -> (u32, u32) {
    (cols as u32 * 2, rows as u32 * 4)
}

/* -----------------------------
   Braille encoding: 2×4 dots -> U+2800..U+28FF
------------------------------ */

const DOT_BITS: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

/// Dots dimmer than this stay dark.
const INK: f32 = 0.08;

pub(crate) fn canvas_to_cells(canvas: &PixelCanvas, out: &mut CellBuffer, enable_color: bool) {
    for cy in 0..out.h {
        for cx in 0..out.w {
            let (px0, py0) = (cx as u32 * 2, cy as u32 * 4);
            let mut mask = 0u8;
            let mut sum = Rgb::default();
            let mut lit = 0u32;
            for (dx, column) in DOT_BITS.iter().enumerate() {
                for (dy, bit) in column.iter().enumerate() {
                    let p = canvas.at(px0 + dx as u32, py0 + dy as u32);
                    if p.r.max(p.g).max(p.b) >= INK {
                        mask |= bit;
                        sum = Rgb::new(sum.r + p.r, sum.g + p.g, sum.b + p.b);
                        lit += 1;
                    }
                }
            }

            let ch = char::from_u32(0x2800 + mask as u32).unwrap_or(' ');
            let fg = if enable_color && lit > 0 {
                let avg = sum.scale(1.0 / lit as f32);
                // keep hue when additive light saturates
                let peak = avg.r.max(avg.g).max(avg.b);
                let avg = if peak > 1.0 { avg.scale(1.0 / peak) } else { avg };
                rgb_color(avg)
            } else {
                Color::White
            };
            out.set(
                cx,
                cy,
                Cell {
                    ch,
                    fg,
                    bg: Color::Black,
                },
            );
        }
    }
}

pub(crate) fn rgb_color(c: Rgb) -> Color {
    let (r, g, b) = c.to_u8();
    Color::Rgb { r, g, b }
}

pub(crate) fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color) {
    for (i, ch) in s.chars().enumerate() {
        let xx = x.saturating_add(i as u16);
        if xx >= buf.w || y >= buf.h {
            break;
        }
        buf.set(
            xx,
            y,
            Cell {
                ch,
                fg,
                bg: Color::Black,
            },
        );
    }
}

fn draw_centered(buf: &mut CellBuffer, y: u16, s: &str, fg: Color) {
    let len = s.chars().count() as u16;
    draw_text(buf, buf.w.saturating_sub(len) / 2, y, s, fg);
}

/// Everything the overlay needs to know about the frame.
pub(crate) struct Hud<'a> {
    pub(crate) era_name: &'a str,
    pub(crate) caption: &'a str,
    /// 0 while the caption is hidden, 1 once fully faded in.
    pub(crate) caption_alpha: f32,
    pub(crate) era_index: usize,
    pub(crate) era_count: usize,
    pub(crate) particles: usize,
    pub(crate) fps: u32,
    pub(crate) autoplay: bool,
    pub(crate) transitioning: bool,
    /// `0..=1` through the running transition.
    pub(crate) progress: f32,
    pub(crate) enable_color: bool,
}

pub(crate) fn hud_overlay(buf: &mut CellBuffer, hud: &Hud<'_>) {
    let dim = Color::Grey;
    let fg = Color::White;

    draw_text(buf, 1, 0, &format!("ERA: {}", hud.era_name), fg);
    let stats = format!("PARTICLES: {}  FPS: {}", hud.particles, hud.fps);
    draw_text(buf, buf.w.saturating_sub(stats.len() as u16 + 1), 0, &stats, dim);

    let status = match (hud.transitioning, hud.autoplay) {
        (true, _) => {
            let pct = (hud.progress.clamp(0.0, 1.0) * 100.0).round() as u32;
            format!("morphing {pct:>3}%")
        }
        (false, true) => "autoplay".to_string(),
        (false, false) => "paused".to_string(),
    };
    draw_text(buf, 1, 1, &status, dim);

    if hud.caption_alpha > 0.0 && buf.h > 4 {
        let col = if hud.enable_color {
            rgb_color(Rgb::WHITE.scale(hud.caption_alpha.clamp(0.0, 1.0)))
        } else {
            fg
        };
        draw_centered(buf, buf.h - 3, hud.caption, col);
    }

    if buf.h > 2 {
        let dots: String = (0..hud.era_count)
            .map(|i| if i == hud.era_index { "●" } else { "○" })
            .collect::<Vec<_>>()
            .join(" ");
        draw_centered(buf, buf.h - 2, &dots, fg);
    }
}

const HELP: &str = "Space, n or → : next era\n\
← : previous era\n\
1-9 : jump to era\n\
a : pause / resume autoplay\n\
h : close this help\n\
q or Esc : quit";

pub(crate) fn help_overlay(buf: &mut CellBuffer) {
    draw_box(buf, "eramorph", HELP);
}

fn put(buf: &mut CellBuffer, x: u16, y: u16, ch: char) {
    buf.set(
        x,
        y,
        Cell {
            ch,
            fg: Color::White,
            bg: Color::Black,
        },
    );
}

fn draw_box(buf: &mut CellBuffer, title: &str, body: &str) {
    let (w, h) = (buf.w, buf.h);
    let bw = min(44, w.saturating_sub(4));
    let bh = min(body.lines().count() as u16 + 5, h.saturating_sub(2));
    if bw < 4 || bh < 4 {
        return;
    }
    let x0 = (w - bw) / 2;
    let y0 = (h - bh) / 2;

    for y in y0..y0 + bh {
        for x in x0..x0 + bw {
            put(buf, x, y, ' ');
        }
    }
    for x in x0..x0 + bw {
        put(buf, x, y0, '─');
        put(buf, x, y0 + bh - 1, '─');
    }
    for y in y0..y0 + bh {
        put(buf, x0, y, '│');
        put(buf, x0 + bw - 1, y, '│');
    }
    put(buf, x0, y0, '┌');
    put(buf, x0 + bw - 1, y0, '┐');
    put(buf, x0, y0 + bh - 1, '└');
    put(buf, x0 + bw - 1, y0 + bh - 1, '┘');

    draw_text(buf, x0 + 2, y0 + 1, title, Color::White);
    for (i, line) in body.lines().enumerate() {
        let yy = y0 + 3 + i as u16;
        if yy >= y0 + bh - 1 {
            break;
        }
        draw_text(buf, x0 + 2, yy, line, Color::White);
    }
}
