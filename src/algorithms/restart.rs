//! The restart controller: the state machine driving the whole solve.
//!
//! A single control thread walks `EXPANDING -> PROJECTING -> CHECKING` until
//! the basis is full, then either terminates or performs a thick restart and
//! resumes expanding. Every accelerator interaction happens inside the
//! component calls (basis extension, restart rotation) as a
//! push/dispatch/pull triple; between phases the host state is consistent,
//! which is where an external abort could be honored.
//!
//! Thick-restart policy: keep every converged Ritz pair plus up to
//! `num_eigs` unconverged ones (best-first). The retained Ritz vectors
//! replace the basis via the Schur-vector rotation, the pending block
//! survives as the continuation block (it is orthogonal to every Ritz
//! vector), and the projection restarts as the retained diagonal plus the
//! arrow coupling `beta_last * S[tail rows, kept]`.

use crate::algorithms::basis::{self, ExpansionOutcome};
use crate::algorithms::ritz::{self, RitzReport};
use crate::algorithms::state::SolverState;
use crate::algorithms::{Phase, kernels};
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::mirror::DeviceArena;
use crate::operator::FilteredOperator;
use crate::utils::random::seeded_rng;
use faer::prelude::ReborrowMut;
use faer::{Mat, MatRef};
use rand::rngs::StdRng;

/// Drives one solve to a terminal phase.
pub(crate) struct RestartController<'a, O: FilteredOperator> {
    op: &'a O,
    cfg: &'a SolverConfig,
    pub state: SolverState,
    phase: Phase,
    /// Restarts performed so far.
    pub restarts: usize,
    /// Operator columns applied so far.
    pub matvecs: usize,
    rng: StdRng,
    staged: Option<ExpansionOutcome>,
    last_report: Option<RitzReport>,
}

impl<'a, O: FilteredOperator> RestartController<'a, O> {
    /// Allocates the state and installs the starting block.
    pub fn new(
        op: &'a O,
        cfg: &'a SolverConfig,
        arena: &mut DeviceArena,
        start: Option<MatRef<'_, f64>>,
    ) -> Result<Self, SolverError> {
        let mut state = SolverState::new(cfg, arena)?;
        let mut rng = seeded_rng(cfg.seed);
        basis::init_starting_block(&mut state, start, &mut rng)?;
        Ok(Self {
            op,
            cfg,
            state,
            phase: Phase::Expanding,
            restarts: 0,
            matvecs: 0,
            rng,
            staged: None,
            last_report: None,
        })
    }

    /// Runs the state machine to a terminal phase. `Ok` is `Converged` or
    /// `Exhausted`; any component failure surfaces as `Err` with the phase
    /// left at `Fatal` and the host state untouched since the last
    /// consistent point.
    pub fn run(&mut self) -> Result<Phase, SolverError> {
        while !self.phase.is_terminal() {
            let step = match self.phase {
                Phase::Expanding => self.on_expand(),
                Phase::Projecting => self.on_project(),
                Phase::Checking => self.on_check(),
                Phase::Restarting => self.on_restart(),
                _ => unreachable!("terminal phase inside the drive loop"),
            };
            match step {
                Ok(next) => self.phase = next,
                Err(e) => {
                    log::error!("solve failed in {:?}: {e}", self.phase);
                    self.phase = Phase::Fatal;
                    return Err(e);
                }
            }
        }
        Ok(self.phase)
    }

    fn on_expand(&mut self) -> Result<Phase, SolverError> {
        let outcome = basis::expand(&mut self.state, self.op, &mut self.rng)?;
        self.matvecs += self.state.bsize;
        self.staged = Some(outcome);
        Ok(Phase::Projecting)
    }

    fn on_project(&mut self) -> Result<Phase, SolverError> {
        let outcome = self
            .staged
            .take()
            .expect("projection without a staged expansion");
        if outcome.breakdowns > 0 {
            log::debug!(
                "step {}: {} column(s) recovered by random replacement",
                self.state.bands.nsteps(),
                outcome.breakdowns
            );
        }
        self.state.bands.append(outcome.alpha, outcome.beta);
        self.state.ncols += self.state.bsize;
        self.state.steps_this_cycle += 1;
        let b = self.state.bsize;
        let retained_blocks = self.state.bands.nretained().div_ceil(b);
        self.state.nblocks = retained_blocks + self.state.bands.nsteps();
        Ok(Phase::Checking)
    }

    fn on_check(&mut self) -> Result<Phase, SolverError> {
        let report = ritz::analyze(&mut self.state, self.cfg)?;
        self.last_report = Some(report);

        if self.state.nconv >= self.cfg.num_eigs {
            log::debug!(
                "converged: {} eigenpair(s) after {} restart(s), {} matvec column(s)",
                self.state.nconv,
                self.restarts,
                self.matvecs
            );
            return Ok(Phase::Converged);
        }
        if !self.state.is_full(self.cfg) {
            return Ok(Phase::Expanding);
        }
        if self.restarts < self.cfg.max_restarts {
            return Ok(Phase::Restarting);
        }
        log::debug!(
            "restart budget exhausted with {} of {} eigenpair(s) converged",
            self.state.nconv,
            self.cfg.num_eigs
        );
        Ok(Phase::Exhausted)
    }

    fn on_restart(&mut self) -> Result<Phase, SolverError> {
        let report = self
            .last_report
            .as_ref()
            .expect("restart without a preceding analysis");
        let b = self.state.bsize;
        let k = report.k;

        // Retention: all converged plus up to num_eigs unconverged, bounded
        // so at least one expansion fits after the rotation.
        let room = self.state.capacity().saturating_sub(2 * b);
        let keep = (self.state.nconv + self.cfg.num_eigs)
            .min(self.cfg.keep_cap())
            .min(room)
            .min(k);

        // Retained couplings come from the pre-rotation data: the arrow is
        // beta_last * S[tail rows, kept].
        let beta_last = self
            .state
            .bands
            .last_beta()
            .expect("restart without a projected step")
            .clone();
        let sh = self.state.schurvecs.host().to_owned();
        let mut ritz_vals = Vec::with_capacity(keep);
        let mut arrow = Mat::<f64>::zeros(b, keep);
        for (j, &slot) in report.order[..keep].iter().enumerate() {
            ritz_vals.push(report.values[slot]);
            for i in 0..b {
                let mut v = 0.0;
                for l in 0..b {
                    v += beta_last.as_ref()[(i, l)] * sh.as_ref()[(k - b + l, slot)];
                }
                arrow.as_mut()[(i, j)] = v;
            }
        }

        // Stage the selected Schur-vector columns (full column height; rows
        // past k are zero) and rotate the basis on the device.
        {
            let rows = self.state.schurvecs.nrows();
            let mut smut = self.state.schurvecs.host_mut();
            for (j, &slot) in report.order[..keep].iter().enumerate() {
                for i in 0..rows {
                    smut[(i, j)] = if i < k { sh.as_ref()[(i, slot)] } else { 0.0 };
                }
            }
        }
        self.state.schurvecs.push_cols(0, keep);
        {
            let vecs = &self.state.vecs;
            let schurvecs = &self.state.schurvecs;
            let dtemp = &mut self.state.dtemp;
            kernels::gemm(
                dtemp.device_mut().subcols_mut(0, keep),
                vecs.device().subcols(0, k),
                schurvecs.device().subrows(0, k).subcols(0, keep),
                1.0,
                false,
            );
            dtemp.pull_cols(0, keep);
        }

        // Compact the basis: rotated Ritz columns first, then the surviving
        // pending block as the continuation block.
        let pending = self.state.vecs.host().subcols(self.state.ncols, b).to_owned();
        {
            let dtemp = &self.state.dtemp;
            let vecs = &mut self.state.vecs;
            let mut vh = vecs.host_mut();
            vh.rb_mut()
                .subcols_mut(0, keep)
                .copy_from(dtemp.host().subcols(0, keep));
            vh.subcols_mut(keep, b).copy_from(pending.as_ref());
        }
        self.state.vecs.push_cols(0, keep + b);

        self.state.bands.reset_cycle(ritz_vals, arrow);
        self.state.ncols = keep;
        self.state.stop = self.state.nconv.min(keep);
        self.state.nblocks = keep.div_ceil(b);
        self.state.steps_this_cycle = 0;
        self.restarts += 1;

        log::debug!(
            "restart {}: kept {} Ritz column(s) ({} locked), basis at {} column(s)",
            self.restarts,
            keep,
            self.state.stop,
            self.state.ncols + b
        );
        Ok(Phase::Expanding)
    }
}
