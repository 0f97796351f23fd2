//! Beam influence onto the receiver grid, and trajectory capture.
//!
//! The influence model is the Cartesian geometric Gaussian beam: each ray
//! carries a beam whose half-width follows `|q|`, and every crossing of a
//! receiver range contributes a Gaussian-weighted, phase-rotated amplitude.
//! Caustic phase (the KMAH index) is accumulated from sign changes of
//! `Re q` along the ray.

use crate::error::MemTracker;
use crate::ray::{RayPt2, RayPt3, Recorder2, Recorder3, Truncated};
use crate::reflect::ray_normal;
use crate::types::{Coherence, Cpx, MIN_POS, PI, Real, Vec3};

use super::{Arrival, EigenHit, JobOut};

/// Beam contributions beyond this many half-widths are dropped.
const BEAM_WINDOW: Real = 4.0;

/// What the influence recorder is collecting.
#[derive(Clone, Copy, Debug)]
pub enum Gather {
    Tl(Coherence),
    Arrivals,
    Eigen,
}

/// Receiver geometry and beam constants shared by all jobs of a run.
#[derive(Clone, Debug)]
pub struct InfluenceCfg {
    pub rz: Vec<Real>,
    pub rr: Vec<Real>,
    /// Receiver bearings (radians); a single entry for 2D runs.
    pub theta: Vec<Real>,
    pub freq: Real,
    /// Fan spacings (radians).
    pub dalpha: Real,
    pub dbeta: Real,
}

impl InfluenceCfg {
    #[inline]
    pub fn omega(&self) -> Real {
        2.0 * PI * self.freq
    }

    #[inline]
    pub fn slice_len(&self) -> usize {
        self.rz.len() * self.rr.len()
    }
}

/// Per-worker dense field scratch, reused across jobs.
#[derive(Debug)]
pub struct WorkerScratch {
    pub tl: Vec<Cpx>,
    pub touched: Vec<u32>,
}

impl WorkerScratch {
    pub fn new(slice_len: usize) -> Self {
        Self { tl: vec![Cpx::new(0.0, 0.0); slice_len], touched: Vec::new() }
    }

    fn deposit(&mut self, cell: u32, v: Cpx) {
        let slot = &mut self.tl[cell as usize];
        if slot.re == 0.0 && slot.im == 0.0 {
            self.touched.push(cell);
        }
        *slot += v;
    }

    /// Drain into a sparse, cell-ordered delta and zero the touched cells.
    fn drain(&mut self) -> Vec<(u32, Cpx)> {
        self.touched.sort_unstable();
        self.touched.dedup();
        let out: Vec<(u32, Cpx)> = self
            .touched
            .iter()
            .map(|&c| (c, self.tl[c as usize]))
            .filter(|(_, v)| v.re != 0.0 || v.im != 0.0)
            .collect();
        for &c in &self.touched {
            self.tl[c as usize] = Cpx::new(0.0, 0.0);
        }
        self.touched.clear();
        out
    }
}

/// Influence recorder for one 2D ray.
pub struct Influence2<'a> {
    gather: Gather,
    cfg: &'a InfluenceCfg,
    scratch: &'a mut WorkerScratch,
    isrc: usize,
    ialpha: usize,
    ibeta: usize,
    alpha0: Real,
    ratio1: Real,
    c_src: Real,
    kmah: Real,
    nsteps: usize,
    arrivals: Vec<(u32, Arrival)>,
    hits: Vec<EigenHit>,
}

impl<'a> Influence2<'a> {
    pub fn new(
        gather: Gather,
        cfg: &'a InfluenceCfg,
        scratch: &'a mut WorkerScratch,
        (isrc, ialpha, ibeta): (usize, usize, usize),
        alpha0: Real,
    ) -> Self {
        Self {
            gather,
            cfg,
            scratch,
            isrc,
            ialpha,
            ibeta,
            alpha0,
            ratio1: alpha0.cos().abs().sqrt(),
            c_src: 1500.0,
            kmah: 0.0,
            nsteps: 0,
            arrivals: Vec::new(),
            hits: Vec::new(),
        }
    }

    pub fn finish(self) -> JobOut {
        match self.gather {
            Gather::Tl(_) => JobOut::Tl(self.scratch.drain()),
            Gather::Arrivals => {
                if self.arrivals.is_empty() {
                    JobOut::Empty
                } else {
                    JobOut::Arr(self.arrivals)
                }
            }
            Gather::Eigen => {
                if self.hits.is_empty() {
                    JobOut::Empty
                } else {
                    JobOut::Eigen(self.hits)
                }
            }
        }
    }

    fn contribute(&mut self, prev: &RayPt2, new: &RayPt2) {
        let (r0, r1) = (prev.x.r, new.x.r);
        if r0 == r1 {
            return;
        }
        let omega = self.cfg.omega();
        let lambda = self.c_src / self.cfg.freq;
        let rr = &self.cfg.rr;
        let nrr = rr.len();

        // half-open crossing interval in the direction of travel
        let (start, end) = if r1 > r0 {
            (rr.partition_point(|&r| r <= r0), rr.partition_point(|&r| r <= r1))
        } else {
            (rr.partition_point(|&r| r < r1), rr.partition_point(|&r| r < r0))
        };

        for irr in start..end {
            let w = (rr[irr] - r0) / (r1 - r0);
            let z_w = prev.x.z + w * (new.x.z - prev.x.z);
            let q_w = prev.q + w * (new.q - prev.q);
            let tau_w = prev.tau + w * (new.tau - prev.tau);
            let c_w = prev.c + w * (new.c - prev.c);
            let t_r = prev.t.r + w * (new.t.r - prev.t.r);
            let t_z = prev.t.z + w * (new.t.z - prev.t.z);

            let qn = q_w.norm().max(MIN_POS);
            let sigma = (qn * self.cfg.dalpha / self.c_src).max(0.5 * lambda);
            let a0 = self.ratio1 * prev.amp * (c_w / qn).sqrt();
            // perpendicular distance factor from the vertical offset
            let cos_ray = (c_w * t_r).abs().min(1.0);

            for (irz, &zr) in self.cfg.rz.iter().enumerate() {
                let n = (zr - z_w).abs() * cos_ray;
                if n > BEAM_WINDOW * sigma {
                    continue;
                }
                let cell = (irz * nrr + irr) as u32;
                let amp = a0 * (-0.5 * (n / sigma) * (n / sigma)).exp() * (omega * tau_w.im).exp();
                let phase = prev.phase + self.kmah;

                match self.gather {
                    Gather::Tl(Coherence::Coherent) => {
                        let ph = phase - omega * tau_w.re;
                        self.scratch.deposit(cell, Cpx::new(amp * ph.cos(), amp * ph.sin()));
                    }
                    Gather::Tl(_) => {
                        self.scratch.deposit(cell, Cpx::new(amp * amp, 0.0));
                    }
                    Gather::Arrivals => {
                        self.arrivals.push((
                            cell,
                            Arrival {
                                amp,
                                phase,
                                delay: tau_w,
                                src_angle: self.alpha0,
                                rcv_angle: t_z.atan2(t_r),
                                num_top_bnc: prev.num_top_bnc,
                                num_bot_bnc: prev.num_bot_bnc,
                            },
                        ));
                    }
                    Gather::Eigen => {
                        if n <= sigma.max(lambda) {
                            self.hits.push(EigenHit {
                                isrc: self.isrc,
                                ialpha: self.ialpha,
                                ibeta: self.ibeta,
                                nsteps: self.nsteps,
                            });
                        }
                    }
                }
            }
        }
    }
}

impl Recorder2 for Influence2<'_> {
    fn launch(&mut self, pt: &RayPt2) -> Result<(), Truncated> {
        self.c_src = pt.c;
        self.nsteps = 1;
        Ok(())
    }

    fn step(&mut self, prev: &RayPt2, pt: &RayPt2) -> Result<(), Truncated> {
        self.nsteps += 1;
        if prev.q.re * pt.q.re < 0.0 {
            // KMAH: the beam loses a quarter period at each caustic
            self.kmah -= 0.5 * PI;
        }
        self.contribute(prev, pt);
        Ok(())
    }
}

/// Trajectory capture with memory accounting, in chunks.
pub struct Traj2<'a> {
    mem: &'a MemTracker,
    points: Vec<RayPt2>,
    charged: usize,
}

/// Points per accounting chunk.
const TRAJ_CHUNK: usize = 4096;

impl<'a> Traj2<'a> {
    pub fn new(mem: &'a MemTracker) -> Self {
        Self { mem, points: Vec::new(), charged: 0 }
    }

    fn push(&mut self, pt: RayPt2) -> Result<(), Truncated> {
        if self.points.len() == self.charged {
            let bytes = TRAJ_CHUNK * std::mem::size_of::<RayPt2>();
            if self.mem.charge(bytes).is_err() {
                return Err(Truncated);
            }
            self.charged += TRAJ_CHUNK;
        }
        self.points.push(pt);
        Ok(())
    }

    /// The captured points and the bytes still charged against the budget.
    pub fn finish(self) -> (Vec<RayPt2>, usize) {
        (self.points, self.charged * std::mem::size_of::<RayPt2>())
    }
}

impl Recorder2 for Traj2<'_> {
    fn launch(&mut self, pt: &RayPt2) -> Result<(), Truncated> {
        self.push(*pt)
    }

    fn step(&mut self, _prev: &RayPt2, pt: &RayPt2) -> Result<(), Truncated> {
        self.push(*pt)
    }
}

/// Influence recorder for one 3D ray.
pub struct Influence3<'a> {
    gather: Gather,
    cfg: &'a InfluenceCfg,
    scratch: &'a mut WorkerScratch,
    isrc: usize,
    ialpha: usize,
    ibeta: usize,
    alpha0: Real,
    /// Source horizontal position; receiver ranges are relative to it.
    origin: (Real, Real),
    ratio1: Real,
    c_src: Real,
    kmah: Real,
    nsteps: usize,
    arrivals: Vec<(u32, Arrival)>,
    hits: Vec<EigenHit>,
}

impl<'a> Influence3<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gather: Gather,
        cfg: &'a InfluenceCfg,
        scratch: &'a mut WorkerScratch,
        (isrc, ialpha, ibeta): (usize, usize, usize),
        alpha0: Real,
        origin: (Real, Real),
    ) -> Self {
        Self {
            gather,
            cfg,
            scratch,
            isrc,
            ialpha,
            ibeta,
            alpha0,
            origin,
            ratio1: alpha0.cos().abs().sqrt(),
            c_src: 1500.0,
            kmah: 0.0,
            nsteps: 0,
            arrivals: Vec::new(),
            hits: Vec::new(),
        }
    }

    /// The bearing slice this job deposits into.
    pub fn itheta(&self) -> usize {
        self.ibeta.min(self.cfg.theta.len() - 1)
    }

    pub fn finish(self) -> JobOut {
        match self.gather {
            Gather::Tl(_) => JobOut::Tl(self.scratch.drain()),
            Gather::Arrivals => {
                if self.arrivals.is_empty() {
                    JobOut::Empty
                } else {
                    JobOut::Arr(self.arrivals)
                }
            }
            Gather::Eigen => {
                if self.hits.is_empty() {
                    JobOut::Empty
                } else {
                    JobOut::Eigen(self.hits)
                }
            }
        }
    }

    fn contribute(&mut self, prev: &RayPt3, new: &RayPt3) {
        let rel0 = (prev.x.x - self.origin.0, prev.x.y - self.origin.1);
        let rel1 = (new.x.x - self.origin.0, new.x.y - self.origin.1);
        let r0 = (rel0.0 * rel0.0 + rel0.1 * rel0.1).sqrt();
        let r1 = (rel1.0 * rel1.0 + rel1.1 * rel1.1).sqrt();
        if r0 == r1 {
            return;
        }
        let omega = self.cfg.omega();
        let lambda = self.c_src / self.cfg.freq;
        let rr = &self.cfg.rr;
        let nrr = rr.len();
        let theta = self.cfg.theta[self.itheta()];
        let (st, ct) = theta.sin_cos();

        let (start, end) = if r1 > r0 {
            (rr.partition_point(|&r| r <= r0), rr.partition_point(|&r| r <= r1))
        } else {
            (rr.partition_point(|&r| r < r1), rr.partition_point(|&r| r < r0))
        };

        for irr in start..end {
            let w = (rr[irr] - r0) / (r1 - r0);
            let x_w = prev.x + w * (new.x - prev.x);
            let t_w = prev.t + w * (new.t - prev.t);
            let qt_w = prev.q_tilde + w * (new.q_tilde - prev.q_tilde);
            let qh_w = prev.q_hat + w * (new.q_hat - prev.q_hat);
            let tau_w = prev.tau + w * (new.tau - prev.tau);
            let c_w = prev.c + w * (new.c - prev.c);

            let (e1, e2) = ray_normal(t_w, prev.phi, c_w);
            let qtn = qt_w.norm().max(MIN_POS);
            let qhn = qh_w.norm().max(MIN_POS);
            let sigma1 = (qtn * self.cfg.dalpha / self.c_src).max(0.5 * lambda);
            let sigma2 = (qhn * self.cfg.dbeta.max(self.cfg.dalpha) / self.c_src).max(0.5 * lambda);
            let a0 = self.ratio1 * prev.amp * c_w / (qtn * qhn).sqrt();

            for (irz, &zr) in self.cfg.rz.iter().enumerate() {
                // receiver in source-relative Cartesian coordinates
                let p = Vec3::new(
                    self.origin.0 + rr[irr] * ct,
                    self.origin.1 + rr[irr] * st,
                    zr,
                );
                let d = p - x_w;
                let n1 = d.dot(e1);
                let n2 = d.dot(e2);
                if n1.abs() > BEAM_WINDOW * sigma1 || n2.abs() > BEAM_WINDOW * sigma2 {
                    continue;
                }
                let cell = (irz * nrr + irr) as u32;
                let gauss = (-0.5 * ((n1 / sigma1) * (n1 / sigma1) + (n2 / sigma2) * (n2 / sigma2))).exp();
                let amp = a0 * gauss * (omega * tau_w.im).exp();
                let phase = prev.phase + self.kmah;

                match self.gather {
                    Gather::Tl(Coherence::Coherent) => {
                        let ph = phase - omega * tau_w.re;
                        self.scratch.deposit(cell, Cpx::new(amp * ph.cos(), amp * ph.sin()));
                    }
                    Gather::Tl(_) => {
                        self.scratch.deposit(cell, Cpx::new(amp * amp, 0.0));
                    }
                    Gather::Arrivals => {
                        let t_h = (t_w.x * t_w.x + t_w.y * t_w.y).sqrt();
                        self.arrivals.push((
                            cell,
                            Arrival {
                                amp,
                                phase,
                                delay: tau_w,
                                src_angle: self.alpha0,
                                rcv_angle: t_w.z.atan2(t_h),
                                num_top_bnc: prev.num_top_bnc,
                                num_bot_bnc: prev.num_bot_bnc,
                            },
                        ));
                    }
                    Gather::Eigen => {
                        if n1.abs() <= sigma1.max(lambda) && n2.abs() <= sigma2.max(lambda) {
                            self.hits.push(EigenHit {
                                isrc: self.isrc,
                                ialpha: self.ialpha,
                                ibeta: self.ibeta,
                                nsteps: self.nsteps,
                            });
                        }
                    }
                }
            }
        }
    }
}

impl Recorder3 for Influence3<'_> {
    fn launch(&mut self, pt: &RayPt3) -> Result<(), Truncated> {
        self.c_src = pt.c;
        self.nsteps = 1;
        Ok(())
    }

    fn step(&mut self, prev: &RayPt3, pt: &RayPt3) -> Result<(), Truncated> {
        self.nsteps += 1;
        if prev.q_tilde.re * pt.q_tilde.re < 0.0 || prev.q_hat.re * pt.q_hat.re < 0.0 {
            self.kmah -= 0.5 * PI;
        }
        self.contribute(prev, pt);
        Ok(())
    }
}

/// 3D trajectory capture with memory accounting.
pub struct Traj3<'a> {
    mem: &'a MemTracker,
    points: Vec<RayPt3>,
    charged: usize,
}

impl<'a> Traj3<'a> {
    pub fn new(mem: &'a MemTracker) -> Self {
        Self { mem, points: Vec::new(), charged: 0 }
    }

    fn push(&mut self, pt: RayPt3) -> Result<(), Truncated> {
        if self.points.len() == self.charged {
            let bytes = TRAJ_CHUNK * std::mem::size_of::<RayPt3>();
            if self.mem.charge(bytes).is_err() {
                return Err(Truncated);
            }
            self.charged += TRAJ_CHUNK;
        }
        self.points.push(pt);
        Ok(())
    }

    pub fn finish(self) -> (Vec<RayPt3>, usize) {
        (self.points, self.charged * std::mem::size_of::<RayPt3>())
    }
}

impl Recorder3 for Traj3<'_> {
    fn launch(&mut self, pt: &RayPt3) -> Result<(), Truncated> {
        self.push(*pt)
    }

    fn step(&mut self, _prev: &RayPt3, pt: &RayPt3) -> Result<(), Truncated> {
        self.push(*pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn cfg() -> InfluenceCfg {
        InfluenceCfg {
            rz: vec![0.0, 500.0, 1000.0],
            rr: vec![1000.0, 2000.0, 3000.0],
            theta: vec![0.0],
            freq: 100.0,
            dalpha: 0.02,
            dbeta: 0.0,
        }
    }

    fn pt(r: Real, z: Real, q: Real, tau: Real) -> RayPt2 {
        RayPt2 {
            x: Vec2::new(r, z),
            t: Vec2::new(1.0 / 1500.0, 0.0),
            p: Cpx::new(1.0, 0.0),
            q: Cpx::new(q, 0.0),
            c: 1500.0,
            tau: Cpx::new(tau, 0.0),
            amp: 1.0,
            phase: 0.0,
            num_top_bnc: 0,
            num_bot_bnc: 0,
        }
    }

    #[test]
    fn test_tl_deposits_on_crossed_ranges_only() {
        let cfg = cfg();
        let mut scratch = WorkerScratch::new(cfg.slice_len());
        let mut inf = Influence2::new(Gather::Tl(Coherence::Coherent), &cfg, &mut scratch, (0, 0, 0), 0.0);
        let a = pt(0.0, 500.0, 1.0, 0.0);
        let b = pt(2500.0, 500.0, 2500.0 * 1500.0, 2500.0 / 1500.0);
        inf.launch(&a).unwrap();
        inf.step(&a, &b).unwrap();
        let out = inf.finish();
        let JobOut::Tl(cells) = out else { panic!("expected TL delta") };
        // ranges 1000 and 2000 crossed, 3000 not; the ray runs at z = 500
        let crossed: Vec<u32> = cells.iter().map(|c| c.0).collect();
        assert!(crossed.contains(&(1 * 3 + 0)));
        assert!(crossed.contains(&(1 * 3 + 1)));
        assert!(!crossed.iter().any(|&c| c % 3 == 2));
    }

    #[test]
    fn test_caustic_adds_quarter_phase() {
        let cfg = cfg();
        let mut scratch = WorkerScratch::new(cfg.slice_len());
        let mut inf = Influence2::new(Gather::Tl(Coherence::Coherent), &cfg, &mut scratch, (0, 0, 0), 0.0);
        let a = pt(0.0, 500.0, 10.0, 0.0);
        let b = pt(500.0, 500.0, -10.0, 0.1);
        inf.launch(&a).unwrap();
        inf.step(&a, &b).unwrap();
        assert_eq!(inf.kmah, -0.5 * PI);
    }

    #[test]
    fn test_arrivals_carry_launch_angle_and_delay() {
        let cfg = cfg();
        let mut scratch = WorkerScratch::new(cfg.slice_len());
        let mut inf = Influence2::new(Gather::Arrivals, &cfg, &mut scratch, (0, 3, 0), 0.12);
        let a = pt(0.0, 500.0, 1.0, 0.0);
        let b = pt(1500.0, 500.0, 1500.0 * 1500.0, 1.0);
        inf.launch(&a).unwrap();
        inf.step(&a, &b).unwrap();
        let JobOut::Arr(list) = inf.finish() else { panic!("expected arrivals") };
        assert!(!list.is_empty());
        let (_, arr) = list[0];
        assert_eq!(arr.src_angle, 0.12);
        // receiver range 1000 of a 1500-long segment: delay = 2/3 of 1.0
        assert!((arr.delay.re - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_traj_truncates_on_budget() {
        let mem = MemTracker::new(16 * std::mem::size_of::<RayPt2>());
        let mut traj = Traj2::new(&mem);
        // first chunk charge (4096 points) cannot fit
        assert!(traj.launch(&pt(0.0, 0.0, 0.0, 0.0)).is_err());
    }
}
