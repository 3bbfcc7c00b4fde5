use core::fmt;

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

/// How the radius search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxStatus {
    /// The unregularized correction already satisfies `||s|| <= lambda * sigma`.
    Interior,
    /// `| ||s|| - lambda * sigma | <= tol`.
    Boundary,
    /// The Newton update no longer changes alpha.
    Stalled,
    /// The iteration budget ran out; the result is an inexact prox value.
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct ProxStats {
    pub status: ProxStatus,
    /// Refactorizations after the first solve.
    pub iterations: usize,
    /// Final regularization parameter.
    pub alpha: f64,
    /// Norm of the correction s.
    pub step_norm: f64,
    /// Target radius lambda * sigma.
    pub radius: f64,
    /// The Gram matrix was singular and the search ran regularized.
    pub rank_deficient: bool,
}

#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    pub alpha: f64,
    pub step_norm: f64,
    pub radius: f64,
    /// Newton increment applied to alpha after this iteration.
    pub alpha_step: f64,
}

/// Non-fatal conditions met during a prox evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A A^T is singular; the search restarted at the given regularization.
    RankDeficient { alpha: f64 },
    /// The Newton iteration did not reach the radius.
    MaxIterations { iterations: usize, gap: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankDeficient { alpha } => write!(
                f,
                "jacobian is rank deficient, retrying with regularization alpha = {alpha:.3e}"
            ),
            Self::MaxIterations { iterations, gap } => write!(
                f,
                "radius search stopped after {iterations} iterations with gap {gap:.3e}, \
                 prox value may be inexact"
            ),
        }
    }
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub trait Reporter {
    fn on_iteration(&mut self, report: &IterationReport);
    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}
    fn on_finish(&mut self) {}
}

/// Collects iterations and prints them as a table when the prox returns.
pub struct StdoutReporter {
    rows: Vec<IterationReport>,
    diagnostics: Vec<Diagnostic>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }

    fn on_finish(&mut self) {
        for diagnostic in self.diagnostics.drain(..) {
            emit_line(&format!("warning: {diagnostic}"));
        }
        if self.rows.is_empty() {
            return;
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("alpha").set_alignment(CellAlignment::Right),
            Cell::new("|s|").set_alignment(CellAlignment::Right),
            Cell::new("radius").set_alignment(CellAlignment::Right),
            Cell::new("gap").set_alignment(CellAlignment::Right),
            Cell::new("d alpha").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.6e}", row.alpha)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.6e}", row.step_norm)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.radius)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.step_norm - row.radius))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.alpha_step)).set_alignment(CellAlignment::Right),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}
