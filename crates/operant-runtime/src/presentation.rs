//! Presentation surfaces and chamber layout
//!
//! The engine does not render anything itself. Each chamber owns a
//! `Presentation` that receives a read-only task snapshot and the cell of the
//! display assigned to the chamber, once per frame.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use operant_core::ChamberId;
use operant_task::TaskSnapshot;
use parking_lot::RwLock;

use crate::RuntimeResult;

/// Rectangle of the display, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Grid arrangement of chamber cells on the display
///
/// Cells are twice as tall as they are wide. Chambers fill the grid row by
/// row: chamber `i` sits at column `i % cols`, row `i / cols`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChamberLayout {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl ChamberLayout {
    /// Fit `chambers` cells on a `width` × `height` display
    pub fn compute(width: u32, height: u32, chambers: u32) -> Self {
        let n = chambers.max(1);
        let (w, h) = (width as f64, height as f64);

        let mut rows = 1;
        let mut cols = n;
        let mut cell_width = (w / n as f64).floor();
        let mut cell_height = (w / n as f64 * 2.0).floor();
        if cell_height > h {
            cell_height = h;
            cell_width = (h / 2.0).floor();
        }
        while cell_height < (h / (rows + 1) as f64).floor() || cols as f64 * cell_width > w {
            rows += 1;
            cell_height = (h / rows as f64).floor();
            cell_width = (cell_height / 2.0).floor();
            cols = n.div_ceil(rows);
        }

        ChamberLayout {
            rows,
            cols,
            cell_width: cell_width as u32,
            cell_height: cell_height as u32,
        }
    }

    /// Number of chamber cells in the grid
    pub fn cells(&self) -> u32 {
        self.rows.saturating_mul(self.cols)
    }

    pub fn region(&self, chamber: ChamberId) -> Region {
        let index = chamber.index();
        Region {
            x: (index % self.cols) * self.cell_width,
            y: (index / self.cols) * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    /// Size of the whole grid
    pub fn extent(&self) -> (u32, u32) {
        (self.cols * self.cell_width, self.rows * self.cell_height)
    }
}

/// Operator interaction observed since the previous logic tick
#[derive(Clone, Debug, PartialEq)]
pub enum OperatorEvent {
    Key(char),
    Pointer { x: u32, y: u32 },
}

/// Shared operator input device, polled once per logic tick
pub trait OperatorInput: Send {
    fn poll(&mut self) -> Vec<OperatorEvent>;
}

/// Input device that never reports anything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInput;

impl OperatorInput for NoInput {
    fn poll(&mut self) -> Vec<OperatorEvent> {
        Vec::new()
    }
}

/// One frame for one chamber
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame counter of the presentation loop
    pub number: u64,
    pub region: Region,
    pub snapshot: TaskSnapshot,
}

/// A chamber's visual surface
pub trait Presentation: Send {
    fn draw(&mut self, frame: &Frame) -> RuntimeResult<()>;

    /// Operator events of the current logic tick
    fn handle_input(&mut self, _events: &[OperatorEvent]) {}
}

/// Latest status line of every chamber
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    lines: Arc<RwLock<BTreeMap<ChamberId, String>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presentation writing into this board
    pub fn presentation(&self) -> Box<dyn Presentation> {
        Box::new(TextPresentation {
            board: self.clone(),
        })
    }

    pub fn line(&self, chamber: ChamberId) -> Option<String> {
        self.lines.read().get(&chamber).cloned()
    }

    pub fn lines(&self) -> Vec<(ChamberId, String)> {
        self.lines
            .read()
            .iter()
            .map(|(id, line)| (*id, line.clone()))
            .collect()
    }

    pub fn forget(&self, chamber: ChamberId) {
        self.lines.write().remove(&chamber);
    }
}

/// Renders a snapshot as one line of text
pub struct TextPresentation {
    board: StatusBoard,
}

/// One-line summary of a task snapshot
pub fn status_line(snapshot: &TaskSnapshot) -> String {
    let mut line = format!("chamber {} {} {}", snapshot.chamber, snapshot.subject, snapshot.task);
    if let Some(phase) = snapshot.phase {
        let _ = write!(line, " [{phase}]");
    }
    let status = if snapshot.complete {
        "complete"
    } else if snapshot.paused {
        "paused"
    } else if snapshot.started {
        "running"
    } else {
        "idle"
    };
    let _ = write!(
        line,
        " {status} {} {:.1}s/{:.1}s",
        snapshot.state,
        snapshot.time_in_state.as_secs_f64(),
        snapshot.elapsed.as_secs_f64(),
    );
    for (key, value) in &snapshot.details {
        let _ = write!(line, " {key}={value}");
    }
    line
}

impl Presentation for TextPresentation {
    fn draw(&mut self, frame: &Frame) -> RuntimeResult<()> {
        let line = status_line(&frame.snapshot);
        self.board.lines.write().insert(frame.snapshot.chamber, line);
        Ok(())
    }
}
