use anyhow::{bail, Result};
use serde::Serialize;

/// Provisioning progress. Forward only; `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ProvisionState {
    Init,
    NetworkReady,
    Formatted,
    Partitioned,
    FilesystemsBuilt,
    Mounted,
    BaseInstalled,
    ChrootHandoff,
    Done,
    Failed,
}

impl ProvisionState {
    pub fn next(self) -> Option<Self> {
        use ProvisionState::*;
        match self {
            Init => Some(NetworkReady),
            NetworkReady => Some(Formatted),
            Formatted => Some(Partitioned),
            Partitioned => Some(FilesystemsBuilt),
            FilesystemsBuilt => Some(Mounted),
            Mounted => Some(BaseInstalled),
            BaseInstalled => Some(ChrootHandoff),
            ChrootHandoff => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProvisionState::Done | ProvisionState::Failed)
    }

    pub fn can_transition_to(self, to: ProvisionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == ProvisionState::Failed || self.next() == Some(to)
    }
}

pub type PhaseFn<'a, C> = Box<dyn Fn(&mut C) -> Result<()> + 'a>;

pub struct PhaseDefinition<'a, C> {
    pub name: &'a str,
    /// State reached when the phase succeeds.
    pub reaches: ProvisionState,
    pub run: PhaseFn<'a, C>,
}

#[derive(Debug)]
pub struct PhaseRunner {
    state: ProvisionState,
    completed: Vec<String>,
}

impl Default for PhaseRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseRunner {
    pub fn new() -> Self {
        Self {
            state: ProvisionState::Init,
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    fn transition(&mut self, to: ProvisionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            bail!("invalid state transition {:?} -> {:?}", self.state, to);
        }
        self.state = to;
        Ok(())
    }

    /// Run `phases` in order against `ctx`, stopping at the first failure.
    pub fn run<C>(
        &mut self,
        ctx: &mut C,
        phases: &[PhaseDefinition<'_, C>],
    ) -> Result<ProvisionState> {
        for phase in phases {
            log::info!("==> {}", phase.name);
            let result = (phase.run)(ctx).and_then(|()| self.transition(phase.reaches));
            if let Err(err) = result {
                log::error!("<== {} failed: {:#}", phase.name, err);
                self.state = ProvisionState::Failed;
                return Err(err.context(format!("phase '{}' failed", phase.name)));
            }
            log::info!("<== {} done", phase.name);
            self.completed.push(phase.name.to_string());
        }
        Ok(self.state)
    }

    pub fn finish(&mut self) -> Result<ProvisionState> {
        self.transition(ProvisionState::Done)?;
        Ok(self.state)
    }
}
