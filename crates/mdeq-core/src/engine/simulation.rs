use super::context::Context;
use super::error::EngineError;
use super::reporters::{ReportView, Reporter};
use super::serialization::StateFile;
use super::state::{State, StateRequest};
use crate::core::forcefield::term::GroupMask;
use crate::core::models::system::MolecularSystem;
use std::path::Path;
use tracing::{debug, info};

/// A [`Context`] together with the structure it was built from and the
/// reporters that observe it.
pub struct Simulation {
    pub structure: MolecularSystem,
    pub context: Context,
    reporters: Vec<Box<dyn Reporter>>,
}

impl Simulation {
    pub fn new(structure: MolecularSystem, context: Context) -> Self {
        Self {
            structure,
            context,
            reporters: Vec::new(),
        }
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn current_step(&self) -> u64 {
        self.context.step_count()
    }

    /// Runs `steps` integration steps, stopping at every step count that is a
    /// multiple of a reporter's interval to let that reporter write.
    pub fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        let end = self.current_step() + steps;
        while self.current_step() < end {
            let current = self.current_step();
            let stride = self
                .reporters
                .iter()
                .filter(|r| r.interval() > 0)
                .map(|r| r.interval() - current % r.interval())
                .fold(end - current, u64::min);
            self.context.step(stride)?;
            self.report_due()?;
        }
        Ok(())
    }

    fn report_due(&mut self) -> Result<(), EngineError> {
        let step = self.current_step();
        let due: Vec<usize> = self
            .reporters
            .iter()
            .enumerate()
            .filter(|(_, r)| r.interval() > 0 && step % r.interval() == 0)
            .map(|(i, _)| i)
            .collect();
        if due.is_empty() {
            return Ok(());
        }
        let nothing = StateRequest::new().with_groups(GroupMask(0));
        let request = due
            .iter()
            .map(|&i| self.reporters[i].needs())
            .fold(nothing, StateRequest::merge);
        let state = self.context.get_state(request)?;
        debug!(step, reporters = due.len(), "Reporting");

        let view = ReportView {
            structure: &self.structure,
            model: self.context.model(),
            degrees_of_freedom: self.context.degrees_of_freedom(),
            step_size: self.context.integrator().step_size,
        };
        for i in due {
            self.reporters[i].report(&view, &state)?;
        }
        Ok(())
    }

    /// Lets every reporter close its output.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        let view = ReportView {
            structure: &self.structure,
            model: self.context.model(),
            degrees_of_freedom: self.context.degrees_of_freedom(),
            step_size: self.context.integrator().step_size,
        };
        for reporter in &mut self.reporters {
            reporter.finish(&view)?;
        }
        Ok(())
    }

    /// Writes positions, velocities, box, parameters, time and step count.
    pub fn save_state(&self, path: &Path) -> Result<State, EngineError> {
        let state = self.context.get_state(StateRequest::everything())?;
        StateFile::write(&state, path)?;
        info!(path = %path.display(), step = state.step_count, "State saved");
        Ok(state)
    }

    pub fn load_state(&mut self, path: &Path) -> Result<(), EngineError> {
        let state = StateFile::read(path)?;
        self.context.load_state(&state)?;
        info!(path = %path.display(), step = state.step_count, "State loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::forces::{Force, ForceParams, HarmonicBondForce, HarmonicBondTerm};
    use crate::core::forcefield::model::InteractionModel;
    use crate::core::models::system::MolecularSystemBuilder;
    use crate::engine::integrator::LangevinIntegrator;
    use crate::engine::platform::Platform;
    use nalgebra::Vector3;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        interval: u64,
        steps: Arc<Mutex<Vec<u64>>>,
        finished: Arc<Mutex<bool>>,
    }

    impl Reporter for Recorder {
        fn interval(&self) -> u64 {
            self.interval
        }

        fn needs(&self) -> StateRequest {
            StateRequest::new().with_positions()
        }

        fn report(&mut self, _view: &ReportView<'_>, state: &State) -> Result<(), EngineError> {
            assert!(state.positions.is_some());
            self.steps.lock().unwrap().push(state.step_count);
            Ok(())
        }

        fn finish(&mut self, _view: &ReportView<'_>) -> Result<(), EngineError> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }
    }

    fn dimer() -> Simulation {
        let mut builder = MolecularSystemBuilder::new();
        builder.start_chain('A');
        builder.start_residue(1, "DIM", false).unwrap();
        builder.add_atom(1, "C1", "C", Vector3::zeros()).unwrap();
        builder
            .add_atom(2, "C2", "C", Vector3::new(0.15, 0.0, 0.0))
            .unwrap();
        builder.add_bond(1, 2);
        let structure = builder.build().unwrap();

        let mut model = InteractionModel::new(vec![12.0, 12.0]);
        model.add_force(Force::new(ForceParams::HarmonicBond(HarmonicBondForce {
            bonds: vec![HarmonicBondTerm {
                atoms: [0, 1],
                length: 0.15,
                k: 200_000.0,
            }],
        })));
        let platform = Platform::by_name("Reference").unwrap();
        let integrator = LangevinIntegrator::new(300.0, 1.0, 0.001);
        let mut context = Context::new(model, integrator, &platform, &[], Some(1)).unwrap();
        context.set_positions(&structure.positions()).unwrap();
        Simulation::new(structure, context)
    }

    fn recorder(interval: u64) -> (Box<Recorder>, Arc<Mutex<Vec<u64>>>, Arc<Mutex<bool>>) {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(false));
        let reporter = Box::new(Recorder {
            interval,
            steps: steps.clone(),
            finished: finished.clone(),
        });
        (reporter, steps, finished)
    }

    #[test]
    fn reporters_fire_on_multiples_of_their_interval() {
        let mut simulation = dimer();
        let (every_three, threes, _) = recorder(3);
        let (every_five, fives, finished) = recorder(5);
        simulation.add_reporter(every_three);
        simulation.add_reporter(every_five);

        simulation.step(7).unwrap();
        simulation.step(8).unwrap();
        simulation.finish().unwrap();

        assert_eq!(simulation.current_step(), 15);
        assert_eq!(*threes.lock().unwrap(), vec![3, 6, 9, 12, 15]);
        assert_eq!(*fives.lock().unwrap(), vec![5, 10, 15]);
        assert!(*finished.lock().unwrap());
    }

    #[test]
    fn saved_state_reloads_into_a_fresh_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.xml");
        let mut source = dimer();
        source.step(5).unwrap();
        let saved = source.save_state(&path).unwrap();

        let mut target = dimer();
        target.load_state(&path).unwrap();
        let restored = target
            .context
            .get_state(StateRequest::everything())
            .unwrap();
        assert_eq!(restored.step_count, 5);
        assert_eq!(restored.positions, saved.positions);
        assert_eq!(restored.velocities, saved.velocities);
    }
}
