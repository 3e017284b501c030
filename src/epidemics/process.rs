//! Compartments, transitions and the per-process transition tables.
//!
//! A `TransitionTable` is an explicit value handed to each `EpidemicState`, so
//! independent runs never share process-wide tables.

use serde::{Deserialize, Serialize};

/// Per-node compartment label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compartment {
    Susceptible,
    Infected,
    Recovered,
}

impl Compartment {
    /// All compartments in count order.
    pub const ALL: [Compartment; 3] = [
        Compartment::Susceptible,
        Compartment::Infected,
        Compartment::Recovered,
    ];

    /// Slot of this compartment in a count array.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Compartment::Susceptible => 0,
            Compartment::Infected => 1,
            Compartment::Recovered => 2,
        }
    }
}

/// Named compartment transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// S → I along an infectious contact.
    Infection,
    /// I → S (SIS-like) or I → R (SIR-like).
    Recovery,
    /// R → S, loss of immunity.
    Waning,
}

impl Transition {
    /// Short key for logs.
    pub fn as_key(&self) -> &'static str {
        match self {
            Transition::Infection => "infection",
            Transition::Recovery => "recovery",
            Transition::Waning => "waning",
        }
    }
}

/// Supported epidemic processes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessKind {
    SI,
    #[default]
    SIS,
    SIR,
    SIRS,
    /// SIS where each infected node spreads at total rate η, split evenly over
    /// its neighbours.
    NodeBasedSIS,
}

impl ProcessKind {
    /// Whether the process has a recovered compartment.
    pub fn has_recovered(&self) -> bool {
        matches!(self, ProcessKind::SIR | ProcessKind::SIRS)
    }

    /// Whether the infection hazard is normalised by the infector's degree.
    pub fn is_node_based(&self) -> bool {
        matches!(self, ProcessKind::NodeBasedSIS)
    }
}

/// One allowed transition: `from --transition--> to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub transition: Transition,
    pub from: Compartment,
    pub to: Compartment,
}

/// The transition set of one process variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionTable {
    process: ProcessKind,
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    /// Table for a built-in process.
    pub fn for_process(process: ProcessKind) -> Self {
        use Compartment::{Infected, Recovered, Susceptible};

        let rule = |transition, from, to| TransitionRule {
            transition,
            from,
            to,
        };
        let infection = rule(Transition::Infection, Susceptible, Infected);

        let rules = match process {
            ProcessKind::SI => vec![infection],
            ProcessKind::SIS | ProcessKind::NodeBasedSIS => {
                vec![infection, rule(Transition::Recovery, Infected, Susceptible)]
            }
            ProcessKind::SIR => vec![infection, rule(Transition::Recovery, Infected, Recovered)],
            ProcessKind::SIRS => vec![
                infection,
                rule(Transition::Recovery, Infected, Recovered),
                rule(Transition::Waning, Recovered, Susceptible),
            ],
        };

        Self { process, rules }
    }

    #[inline]
    pub fn process(&self) -> ProcessKind {
        self.process
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// Target compartment of `transition` from `from`, if the process allows it.
    pub fn target(&self, transition: Transition, from: Compartment) -> Option<Compartment> {
        self.rules
            .iter()
            .find(|rule| rule.transition == transition && rule.from == from)
            .map(|rule| rule.to)
    }

    /// Whether the process has `transition` at all.
    pub fn allows(&self, transition: Transition) -> bool {
        self.rules.iter().any(|rule| rule.transition == transition)
    }

    /// Whether nodes can ever be in `compartment`.
    pub fn uses(&self, compartment: Compartment) -> bool {
        compartment == Compartment::Susceptible
            || self
                .rules
                .iter()
                .any(|rule| rule.from == compartment || rule.to == compartment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sis_table() {
        let table = TransitionTable::for_process(ProcessKind::SIS);
        assert_eq!(
            table.target(Transition::Recovery, Compartment::Infected),
            Some(Compartment::Susceptible)
        );
        assert_eq!(table.target(Transition::Recovery, Compartment::Susceptible), None);
        assert!(!table.allows(Transition::Waning));
        assert!(!table.uses(Compartment::Recovered));
    }

    #[test]
    fn test_sirs_table() {
        let table = TransitionTable::for_process(ProcessKind::SIRS);
        assert_eq!(
            table.target(Transition::Recovery, Compartment::Infected),
            Some(Compartment::Recovered)
        );
        assert_eq!(
            table.target(Transition::Waning, Compartment::Recovered),
            Some(Compartment::Susceptible)
        );
        assert!(table.uses(Compartment::Recovered));
    }

    #[test]
    fn test_si_has_no_recovery() {
        let table = TransitionTable::for_process(ProcessKind::SI);
        assert!(!table.allows(Transition::Recovery));
        assert_eq!(table.rules().len(), 1);
    }

    #[test]
    fn test_node_based_flags() {
        assert!(ProcessKind::NodeBasedSIS.is_node_based());
        assert!(!ProcessKind::NodeBasedSIS.has_recovered());
        assert!(ProcessKind::SIR.has_recovered());
    }
}
