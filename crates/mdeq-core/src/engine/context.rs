use super::barostat::{MonteCarloBarostat, MoveOutcome};
use super::constraints::ConstraintSolver;
use super::error::EngineError;
use super::integrator::LangevinIntegrator;
use super::minimizer::{self, MinimizationReport};
use super::platform::Platform;
use super::state::{State, StateRequest};
use crate::core::forcefield::energy::{Evaluation, ForceEvaluator};
use crate::core::forcefield::forces::ForceParams;
use crate::core::forcefield::model::InteractionModel;
use crate::core::forcefield::term::{GroupMask, MAX_FORCE_GROUPS};
use crate::core::models::cell::BoxVectors;
use crate::core::units::BOLTZ;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use rayon::ThreadPool;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

const PRESSURE_X: &str = "MonteCarloPressureX";
const PRESSURE_Y: &str = "MonteCarloPressureY";
const PRESSURE_Z: &str = "MonteCarloPressureZ";
const TEMPERATURE: &str = "MonteCarloTemperature";

/// Evaluates forces, on a dedicated thread pool when the platform has one.
struct ForceRunner {
    evaluator: ForceEvaluator,
    pool: Option<ThreadPool>,
}

impl ForceRunner {
    fn evaluate(
        &self,
        model: &InteractionModel,
        positions: &[Vector3<f64>],
        cell: Option<&BoxVectors>,
        groups: GroupMask,
    ) -> Result<Evaluation, EngineError> {
        let run = || self.evaluator.evaluate(model, positions, cell, groups);
        let evaluation = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }?;
        Ok(evaluation)
    }

    fn potential_energy(
        &self,
        model: &InteractionModel,
        positions: &[Vector3<f64>],
        cell: Option<&BoxVectors>,
        step: u64,
    ) -> Result<f64, EngineError> {
        let energy = self
            .evaluate(model, positions, cell, GroupMask::ALL)?
            .energies
            .total();
        if !energy.is_finite() {
            return Err(EngineError::NonFiniteEnergy { step });
        }
        Ok(energy)
    }
}

/// A running simulation of one [`InteractionModel`].
///
/// The context owns the dynamical state (positions, velocities, box, time
/// and step count) and advances it with its integrator. Forces are
/// evaluated on the chosen [`Platform`].
pub struct Context {
    model: InteractionModel,
    integrator: LangevinIntegrator,
    platform: Platform,
    runner: ForceRunner,
    solver: ConstraintSolver,
    inverse_masses: Vec<f64>,
    positions: Vec<Vector3<f64>>,
    velocities: Vec<Vector3<f64>>,
    cell: Option<BoxVectors>,
    time: f64,
    step_count: u64,
    rng: Pcg64,
    barostat: Option<MonteCarloBarostat>,
    cm_motion_frequency: Option<u32>,
    /// Smallest box length the nonbonded cutoff allows.
    min_box_length: Option<f64>,
    parameters: BTreeMap<String, f64>,
}

impl Context {
    /// Creates a context for `model`.
    ///
    /// `properties` are applied to a copy of `platform`. The model must have a
    /// default box if any of its forces is periodic, every force group must be
    /// below 32 and a barostat must run at the integrator's temperature.
    pub fn new(
        model: InteractionModel,
        integrator: LangevinIntegrator,
        platform: &Platform,
        properties: &[(String, String)],
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        let platform = platform
            .clone()
            .with_properties(properties.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let mut barostat_settings = None;
        let mut cm_motion_frequency = None;
        let mut min_box_length: Option<f64> = None;
        for force in model.forces() {
            if force.group as usize >= MAX_FORCE_GROUPS {
                return Err(EngineError::InvalidForceGroup {
                    force: force.name(),
                    group: force.group,
                });
            }
            match &force.params {
                ForceParams::AnisotropicBarostat(b) => {
                    if (b.temperature - integrator.temperature).abs() > 1e-9 {
                        return Err(EngineError::TemperatureMismatch {
                            barostat: b.temperature,
                            integrator: integrator.temperature,
                        });
                    }
                    barostat_settings.get_or_insert(*b);
                }
                ForceParams::CmMotionRemover(c) if c.frequency > 0 => {
                    cm_motion_frequency = Some(c.frequency);
                }
                ForceParams::Nonbonded(nb) if nb.method.is_periodic() => {
                    let limit = 2.0 * nb.cutoff;
                    min_box_length = Some(min_box_length.map_or(limit, |l| l.max(limit)));
                }
                _ => {}
            }
        }

        let cell = model.default_box().copied();
        if cell.is_none()
            && (model.uses_periodic_boundary_conditions() || barostat_settings.is_some())
        {
            return Err(EngineError::MissingBox);
        }

        let evaluator = ForceEvaluator::new(&model, cell.as_ref())?
            .with_parallel(platform.is_parallel());
        let pool = if platform.is_parallel() {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(platform.threads())
                    .build()?,
            )
        } else {
            None
        };

        let inverse_masses = ConstraintSolver::inverse_masses(model.masses());
        let solver = ConstraintSolver::new(
            model.constraints(),
            inverse_masses.clone(),
            integrator.constraint_tolerance,
        );

        let mut parameters = BTreeMap::new();
        let barostat = match (barostat_settings, cell) {
            (Some(settings), Some(cell)) => {
                parameters.insert(PRESSURE_X.to_string(), settings.pressure.x);
                parameters.insert(PRESSURE_Y.to_string(), settings.pressure.y);
                parameters.insert(PRESSURE_Z.to_string(), settings.pressure.z);
                parameters.insert(TEMPERATURE.to_string(), settings.temperature);
                Some(MonteCarloBarostat::new(settings, cell.volume()))
            }
            _ => None,
        };

        let rng = match seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };
        let n = model.particle_count();
        info!(
            platform = platform.name(),
            particles = n,
            constraints = model.constraints().len(),
            forces = model.forces().len(),
            "Context created"
        );

        Ok(Self {
            model,
            integrator,
            platform,
            runner: ForceRunner { evaluator, pool },
            solver,
            inverse_masses,
            positions: vec![Vector3::zeros(); n],
            velocities: vec![Vector3::zeros(); n],
            cell,
            time: 0.0,
            step_count: 0,
            rng,
            barostat,
            cm_motion_frequency,
            min_box_length,
            parameters,
        })
    }

    pub fn model(&self) -> &InteractionModel {
        &self.model
    }

    pub fn integrator(&self) -> &LangevinIntegrator {
        &self.integrator
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn box_vectors(&self) -> Option<&BoxVectors> {
        self.cell.as_ref()
    }

    pub fn degrees_of_freedom(&self) -> usize {
        self.model.degrees_of_freedom()
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        let Some(slot) = self.parameters.get_mut(name) else {
            return Err(EngineError::UnknownParameter(name.to_string()));
        };
        *slot = value;
        if let Some(barostat) = self.barostat.as_mut() {
            let mut settings = *barostat.settings();
            match name {
                PRESSURE_X => settings.pressure.x = value,
                PRESSURE_Y => settings.pressure.y = value,
                PRESSURE_Z => settings.pressure.z = value,
                TEMPERATURE => settings.temperature = value,
                _ => {}
            }
            barostat.update_settings(settings);
        }
        Ok(())
    }

    fn check_count(what: &'static str, expected: usize, actual: usize) -> Result<(), EngineError> {
        if expected != actual {
            return Err(EngineError::StateMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<(), EngineError> {
        Self::check_count("positions", self.positions.len(), positions.len())?;
        self.positions.copy_from_slice(positions);
        Ok(())
    }

    pub fn set_velocities(&mut self, velocities: &[Vector3<f64>]) -> Result<(), EngineError> {
        Self::check_count("velocities", self.velocities.len(), velocities.len())?;
        self.velocities.copy_from_slice(velocities);
        Ok(())
    }

    /// Draws velocities from a Maxwell-Boltzmann distribution at `temperature`
    /// and removes their components along constraints.
    pub fn set_velocities_to_temperature(
        &mut self,
        temperature: f64,
        seed: Option<u64>,
    ) -> Result<(), EngineError> {
        let mut seeded;
        let rng: &mut Pcg64 = match seed {
            Some(seed) => {
                seeded = Pcg64::seed_from_u64(seed);
                &mut seeded
            }
            None => &mut self.rng,
        };
        let kt = BOLTZ * temperature;
        for (v, &w) in self.velocities.iter_mut().zip(&self.inverse_masses) {
            if w == 0.0 {
                *v = Vector3::zeros();
                continue;
            }
            let sigma = (kt * w).sqrt();
            let (x, y, z): (f64, f64, f64) = (
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
            );
            *v = Vector3::new(x, y, z) * sigma;
        }
        self.solver
            .project(&self.positions, &mut self.velocities, self.cell.as_ref())?;
        debug!(temperature, "Velocities initialized");
        Ok(())
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn set_step_count(&mut self, step_count: u64) {
        self.step_count = step_count;
    }

    /// Replaces the periodic box. The box must stay at least twice the
    /// nonbonded cutoff along every axis.
    pub fn set_box_vectors(&mut self, cell: BoxVectors) -> Result<(), EngineError> {
        if !cell.is_valid() {
            return Err(EngineError::InvalidBox(format!("{cell}")));
        }
        if let Some(limit) = self.min_box_length {
            if cell.min_length() < limit {
                return Err(EngineError::InvalidBox(format!(
                    "{cell} is smaller than twice the cutoff ({limit} nm)"
                )));
            }
        }
        self.cell = Some(cell);
        Ok(())
    }

    pub fn get_state(&self, request: StateRequest) -> Result<State, EngineError> {
        let mut state = State {
            time: self.time,
            step_count: self.step_count,
            box_vectors: self.cell,
            ..Default::default()
        };
        if request.positions {
            state.positions = Some(self.positions.clone());
        }
        if request.velocities {
            state.velocities = Some(self.velocities.clone());
        }
        if request.energy {
            let evaluation = self.runner.evaluate(
                &self.model,
                &self.positions,
                self.cell.as_ref(),
                request.groups,
            )?;
            let potential = evaluation.energies.total_for(request.groups);
            if !potential.is_finite() {
                return Err(EngineError::NonFiniteEnergy {
                    step: self.step_count,
                });
            }
            state.potential_energy = Some(potential);
            state.kinetic_energy = Some(self.kinetic_energy());
            state.group_energies = Some(evaluation.energies);
        }
        if request.parameters {
            state.parameters = self.parameters.clone();
        }
        Ok(state)
    }

    fn kinetic_energy(&self) -> f64 {
        self.velocities
            .iter()
            .zip(self.model.masses())
            .map(|(v, m)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Moves positions onto the constraint surface and projects velocities.
    pub fn apply_constraints(&mut self) -> Result<(), EngineError> {
        let reference = self.positions.clone();
        self.solver
            .apply(&reference, &mut self.positions, self.cell.as_ref())?;
        self.solver
            .project(&self.positions, &mut self.velocities, self.cell.as_ref())?;
        Ok(())
    }

    /// Advances the simulation by `steps` integration steps.
    pub fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        for _ in 0..steps {
            let evaluation = self.runner.evaluate(
                &self.model,
                &self.positions,
                self.cell.as_ref(),
                GroupMask::ALL,
            )?;
            if !evaluation.energies.is_finite() {
                return Err(EngineError::NonFiniteEnergy {
                    step: self.step_count,
                });
            }
            self.integrator.advance(
                &mut self.positions,
                &mut self.velocities,
                &evaluation.forces,
                &self.inverse_masses,
                &self.solver,
                self.cell.as_ref(),
                &mut self.rng,
            )?;
            self.step_count += 1;
            self.time += self.integrator.step_size;

            if self
                .cm_motion_frequency
                .is_some_and(|f| self.step_count % u64::from(f) == 0)
            {
                self.remove_cm_motion();
            }
            if self
                .barostat
                .as_ref()
                .is_some_and(|b| {
                    b.frequency() > 0 && self.step_count % u64::from(b.frequency()) == 0
                })
            {
                self.barostat_move()?;
            }
        }
        Ok(())
    }

    fn remove_cm_motion(&mut self) {
        let masses = self.model.masses();
        let (momentum, mass) = self
            .velocities
            .iter()
            .zip(masses)
            .filter(|(_, m)| **m > 0.0)
            .fold(
                (Vector3::zeros(), 0.0),
                |(p, total), (v, m)| (p + v * *m, total + m),
            );
        if mass == 0.0 {
            return;
        }
        let drift = momentum / mass;
        for (v, m) in self.velocities.iter_mut().zip(masses) {
            if *m > 0.0 {
                *v -= drift;
            }
        }
    }

    fn barostat_move(&mut self) -> Result<(), EngineError> {
        let (Some(barostat), Some(cell)) = (self.barostat.as_mut(), self.cell.as_mut()) else {
            return Ok(());
        };
        let step = self.step_count;
        let runner = &self.runner;
        let model = &self.model;
        let current = runner.potential_energy(model, &self.positions, Some(&*cell), step)?;
        let outcome = barostat.attempt(
            &mut self.positions,
            cell,
            model.molecules(),
            self.min_box_length,
            current,
            &mut self.rng,
            |positions, trial_cell| {
                let energy = runner
                    .evaluate(model, positions, Some(trial_cell), GroupMask::ALL)?
                    .energies
                    .total();
                Ok(if energy.is_finite() {
                    energy
                } else {
                    f64::INFINITY
                })
            },
        )?;
        if let MoveOutcome::Accepted { axis } = outcome {
            trace!(step, axis, cell = %cell, "barostat move accepted");
        }
        Ok(())
    }

    /// Minimizes the potential energy with constraints held fixed.
    ///
    /// Positions are first moved onto the constraint surface, so the reported
    /// `initial_energy` is that of the constrained structure and can differ from
    /// the energy [`get_state`](Self::get_state) gave for the raw input. Call
    /// [`apply_constraints`](Self::apply_constraints) beforehand to observe the
    /// same starting point.
    ///
    /// Stops when the RMS force drops below `tolerance` (kJ/mol/nm) or after
    /// `max_iterations` iterations; `0` means no limit. Velocities are left
    /// untouched.
    pub fn minimize(
        &mut self,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<MinimizationReport, EngineError> {
        let weights = self
            .model
            .masses()
            .iter()
            .map(|&m| if m > 0.0 { 1.0 } else { 0.0 })
            .collect();
        let solver = ConstraintSolver::new(
            self.model.constraints(),
            weights,
            self.integrator.constraint_tolerance,
        );
        let runner = &self.runner;
        let model = &self.model;
        let cell = self.cell.as_ref();
        let report = minimizer::minimize(
            &mut self.positions,
            &solver,
            cell,
            tolerance,
            max_iterations,
            |positions| {
                let evaluation = runner.evaluate(model, positions, cell, GroupMask::ALL)?;
                Ok((evaluation.energies.total(), evaluation.forces))
            },
        )?;
        info!(
            iterations = report.iterations,
            initial_energy = report.initial_energy,
            final_energy = report.final_energy,
            "Energy minimized"
        );
        Ok(report)
    }

    /// Restores whatever `state` contains: positions, velocities, box,
    /// parameters, time and step count.
    pub fn load_state(&mut self, state: &State) -> Result<(), EngineError> {
        if let Some(positions) = &state.positions {
            self.set_positions(positions)?;
        }
        if let Some(velocities) = &state.velocities {
            self.set_velocities(velocities)?;
        }
        if let Some(cell) = state.box_vectors {
            self.set_box_vectors(cell)?;
        }
        for (name, value) in &state.parameters {
            self.set_parameter(name, *value)?;
        }
        self.time = state.time;
        self.step_count = state.step_count;
        debug!(time = state.time, step = state.step_count, "State loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::forces::{
        AnisotropicBarostat, CmMotionRemover, Force, HarmonicBondForce, HarmonicBondTerm,
        NonbondedException, NonbondedForce, NonbondedMethod, NonbondedParticle,
    };
    use crate::core::forcefield::model::Constraint;
    use crate::core::units::REACTION_FIELD_DIELECTRIC;

    const EDGE: f64 = 2.0;

    /// Eight Lennard-Jones diatomics on a lattice in a 2 nm box.
    fn diatomic_fluid(with_barostat: bool) -> InteractionModel {
        let mut model = InteractionModel::new(vec![14.0; 16]);
        let mut bonds = HarmonicBondForce::default();
        let mut particles = Vec::new();
        let mut exceptions = Vec::new();
        let mut molecules = Vec::new();
        for m in 0..8 {
            let (i, j) = (2 * m, 2 * m + 1);
            bonds.bonds.push(HarmonicBondTerm {
                atoms: [i, j],
                length: 0.11,
                k: 300_000.0,
            });
            exceptions.push(NonbondedException {
                atoms: [i, j],
                charge_prod: 0.0,
                sigma: 1.0,
                epsilon: 0.0,
            });
            molecules.push(vec![i, j]);
            for _ in 0..2 {
                particles.push(NonbondedParticle {
                    charge: 0.0,
                    sigma: 0.33,
                    epsilon: 0.3,
                });
            }
        }
        model.add_force(Force::new(ForceParams::HarmonicBond(bonds)));
        model.add_force(Force::new(ForceParams::Nonbonded(NonbondedForce {
            method: NonbondedMethod::CutoffPeriodic,
            cutoff: 0.9,
            ewald_error_tolerance: 1e-4,
            use_dispersion_correction: true,
            reaction_field_dielectric: REACTION_FIELD_DIELECTRIC,
            particles,
            exceptions,
        })));
        let remover = CmMotionRemover { frequency: 1 };
        model.add_force(Force::new(ForceParams::CmMotionRemover(remover)));
        if with_barostat {
            model.add_force(Force::new(ForceParams::AnisotropicBarostat(AnisotropicBarostat {
                pressure: Vector3::new(1.0, 1.0, 0.0),
                temperature: 300.0,
                scale: [true, true, false],
                frequency: 2,
            })));
        }
        for (g, force) in model.forces_mut().iter_mut().enumerate() {
            force.group = g as u32;
        }
        model.set_molecules(molecules);
        model.set_default_box(Some(BoxVectors::new(EDGE, EDGE, EDGE)));
        model
    }

    fn lattice() -> Vec<Vector3<f64>> {
        let mut positions = Vec::new();
        for x in 0..2 {
            for y in 0..2 {
                for z in 0..2 {
                    let base = Vector3::new(x as f64, y as f64, z as f64) + Vector3::repeat(0.3);
                    positions.push(base);
                    positions.push(base + Vector3::new(0.12, 0.0, 0.0));
                }
            }
        }
        positions
    }

    fn energy_of(context: &Context, groups: GroupMask) -> f64 {
        let request = StateRequest::new().with_energy().with_groups(groups);
        let state = context.get_state(request).unwrap();
        state.potential_energy.unwrap()
    }

    fn context(model: InteractionModel, platform: &str) -> Context {
        let platform = Platform::by_name(platform).unwrap();
        let integrator = LangevinIntegrator::new(300.0, 5.0, 0.001);
        let mut context = Context::new(model, integrator, &platform, &[], Some(42)).unwrap();
        context.set_positions(&lattice()).unwrap();
        context
    }

    #[test]
    fn creation_validates_groups_temperature_and_box() {
        let platform = Platform::by_name("Reference").unwrap();
        let integrator = LangevinIntegrator::new(300.0, 5.0, 0.001);

        let mut model = diatomic_fluid(false);
        model.forces_mut()[0].group = 32;
        assert!(matches!(
            Context::new(model, integrator, &platform, &[], None),
            Err(EngineError::InvalidForceGroup { group: 32, .. })
        ));

        let hot = LangevinIntegrator::new(310.0, 5.0, 0.001);
        assert!(matches!(
            Context::new(diatomic_fluid(true), hot, &platform, &[], None),
            Err(EngineError::TemperatureMismatch { .. })
        ));

        let mut model = diatomic_fluid(false);
        model.set_default_box(None);
        assert!(matches!(
            Context::new(model, integrator, &platform, &[], None),
            Err(EngineError::MissingBox)
        ));

        let model = diatomic_fluid(false);
        let properties = vec![("Precision".to_string(), "quad".to_string())];
        assert!(matches!(
            Context::new(model, integrator, &platform, &properties, None),
            Err(EngineError::InvalidPropertyValue { .. })
        ));
    }

    #[test]
    fn set_positions_checks_particle_count() {
        let mut context = context(diatomic_fluid(false), "Reference");
        assert!(matches!(
            context.set_positions(&[Vector3::zeros()]),
            Err(EngineError::StateMismatch {
                what: "positions",
                expected: 16,
                actual: 1
            })
        ));
    }

    #[test]
    fn stepping_advances_time_and_step_count() {
        let mut context = context(diatomic_fluid(false), "Reference");
        context
            .set_velocities_to_temperature(300.0, Some(1))
            .unwrap();
        context.step(10).unwrap();
        assert_eq!(context.step_count(), 10);
        assert!((context.time() - 0.01).abs() < 1e-12);

        let state = context
            .get_state(StateRequest::new().with_velocities().with_energy())
            .unwrap();
        let velocities = state.velocities.unwrap();
        let momentum: Vector3<f64> = velocities.iter().map(|v| v * 14.0).sum();
        assert!(momentum.norm() < 1e-9);
        assert!(state.potential_energy.unwrap().is_finite());
    }

    #[test]
    fn group_mask_selects_energy_terms() {
        let context = context(diatomic_fluid(false), "Reference");
        let all = energy_of(&context, GroupMask::ALL);
        let bonds = energy_of(&context, GroupMask::single(0));
        let lj = energy_of(&context, GroupMask::single(1));
        assert!((all - (bonds + lj)).abs() < 1e-9);
        assert!(bonds > 0.0);
    }

    #[test]
    fn cpu_and_reference_platforms_agree() {
        let reference = context(diatomic_fluid(false), "Reference");
        let cpu = context(diatomic_fluid(false), "CPU");
        let e_ref = energy_of(&reference, GroupMask::ALL);
        let e_cpu = energy_of(&cpu, GroupMask::ALL);
        assert!((e_ref - e_cpu).abs() < 1e-8 * e_ref.abs().max(1.0));
    }

    #[test]
    fn minimization_lowers_energy() {
        let mut context = context(diatomic_fluid(false), "Reference");
        let report = context.minimize(10.0, 0).unwrap();
        assert!(report.final_energy <= report.initial_energy);
        let after = energy_of(&context, GroupMask::ALL);
        assert!((after - report.final_energy).abs() < 1e-6);
    }

    #[test]
    fn minimization_starts_from_the_constrained_structure() {
        let mut model = diatomic_fluid(false);
        for m in 0..8 {
            model.add_constraint(Constraint {
                atoms: [2 * m, 2 * m + 1],
                distance: 0.11,
            });
        }
        let mut raw = context(model.clone(), "Reference");
        let unconstrained = energy_of(&raw, GroupMask::ALL);
        let from_raw = raw.minimize(10.0, 0).unwrap();

        let mut prepared = context(model, "Reference");
        prepared.apply_constraints().unwrap();
        let constrained = energy_of(&prepared, GroupMask::ALL);
        let from_prepared = prepared.minimize(10.0, 0).unwrap();

        let tolerance = 1e-9 * constrained.abs().max(1.0);
        assert!((unconstrained - constrained).abs() > 1.0);
        assert!((from_raw.initial_energy - constrained).abs() < tolerance);
        assert!((from_prepared.initial_energy - constrained).abs() < tolerance);
    }

    #[test]
    fn barostat_changes_only_scaled_axes() {
        let mut context = context(diatomic_fluid(true), "Reference");
        context
            .set_velocities_to_temperature(300.0, Some(3))
            .unwrap();
        context.step(40).unwrap();
        let cell = *context.box_vectors().unwrap();
        assert_eq!(cell.lengths.z, EDGE);
        assert!(cell.lengths.x >= 1.8 && cell.lengths.y >= 1.8);
        assert_eq!(context.parameter("MonteCarloTemperature"), Some(300.0));
    }

    #[test]
    fn constraints_are_enforced_by_apply_and_step() {
        let mut model = diatomic_fluid(false);
        for m in 0..8 {
            model.add_constraint(Constraint {
                atoms: [2 * m, 2 * m + 1],
                distance: 0.11,
            });
        }
        let mut context = context(model, "Reference");
        context.apply_constraints().unwrap();
        context
            .set_velocities_to_temperature(300.0, Some(5))
            .unwrap();
        context.step(20).unwrap();
        let state = context
            .get_state(StateRequest::new().with_positions())
            .unwrap();
        let positions = state.positions.unwrap();
        for m in 0..8 {
            let r = (positions[2 * m + 1] - positions[2 * m]).norm();
            assert!((r - 0.11).abs() < 1e-5);
        }
    }

    #[test]
    fn state_round_trips_through_load_state() {
        let mut source = context(diatomic_fluid(true), "Reference");
        source
            .set_velocities_to_temperature(300.0, Some(9))
            .unwrap();
        source.step(4).unwrap();
        let state = source.get_state(StateRequest::everything()).unwrap();

        let mut target = context(diatomic_fluid(true), "Reference");
        target.load_state(&state).unwrap();
        let restored = target.get_state(StateRequest::everything()).unwrap();
        assert_eq!(restored.positions, state.positions);
        assert_eq!(restored.velocities, state.velocities);
        assert_eq!(restored.box_vectors, state.box_vectors);
        assert_eq!(restored.step_count, 4);
        assert_eq!(restored.parameters, state.parameters);
    }

    #[test]
    fn box_smaller_than_twice_the_cutoff_is_rejected() {
        let mut context = context(diatomic_fluid(false), "Reference");
        assert!(matches!(
            context.set_box_vectors(BoxVectors::new(1.5, 2.0, 2.0)),
            Err(EngineError::InvalidBox(_))
        ));
        context
            .set_box_vectors(BoxVectors::new(2.1, 2.0, 2.0))
            .unwrap();
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let mut context = context(diatomic_fluid(true), "Reference");
        context.set_parameter("MonteCarloPressureZ", 2.0).unwrap();
        assert_eq!(context.parameter("MonteCarloPressureZ"), Some(2.0));
        assert!(matches!(
            context.set_parameter("Bogus", 1.0),
            Err(EngineError::UnknownParameter(_))
        ));
    }
}
