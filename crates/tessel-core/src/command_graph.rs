// SPDX-License-Identifier: Apache-2.0
//! Arena-owned command storage with dependency tracking and per-node
//! execution fronts.
//!
//! Commands are stored by id in ordered maps so every iteration the graph
//! exposes is deterministic for identical build sequences. Dependency edges
//! are `(CommandId, anti)` pairs on the depender; cross-node coordination is
//! never expressed as an edge (push / await-push pairs carry it instead).

use std::collections::{BTreeMap, BTreeSet};

use crate::command::{Command, CommandKind, CommandTag, Dependency};
use crate::ident::{CommandId, NodeId, TaskId};

/// Errors for dependency edits on the command graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Referenced command id is not in the graph.
    #[error("unknown command: {0}")]
    UnknownCommand(CommandId),
    /// A command may only depend on commands of its own node.
    #[error("dependency across nodes: {depender} on {depender_nid} depends on {dependee} on {dependee_nid}")]
    CrossNodeDependency {
        /// The command gaining the edge.
        depender: CommandId,
        /// Its node.
        depender_nid: NodeId,
        /// The command depended upon.
        dependee: CommandId,
        /// Its node.
        dependee_nid: NodeId,
    },
    /// A command may not depend on itself.
    #[error("self dependency: {0}")]
    SelfDependency(CommandId),
}

/// Owns all commands of a build and their indices.
#[derive(Debug, Default)]
pub struct CommandGraph {
    next_cid: u64,
    commands: BTreeMap<CommandId, Command>,
    by_task: BTreeMap<TaskId, Vec<CommandId>>,
    fronts: BTreeMap<NodeId, BTreeSet<CommandId>>,
    max_pcpl: u32,
}

impl CommandGraph {
    /// Empty graph; ids start at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a command on `nid`, allocating the next id.
    ///
    /// The command starts with `pseudo_cpl = 1` and no dependencies. Task
    /// commands (compute, master-access) are indexed under `tid`; everything
    /// except `Nop` enters the node's execution front.
    pub fn create(&mut self, nid: NodeId, tid: Option<TaskId>, kind: CommandKind) -> CommandId {
        let cid = CommandId(self.next_cid);
        self.next_cid += 1;
        if kind.is_task_command() {
            if let Some(tid) = tid {
                self.by_task.entry(tid).or_default().push(cid);
            }
        }
        if kind.tag() != CommandTag::Nop {
            self.fronts.entry(nid).or_default().insert(cid);
        }
        self.commands.insert(
            cid,
            Command {
                cid,
                nid,
                tid,
                deps: Vec::new(),
                pseudo_cpl: 1,
                kind,
            },
        );
        cid
    }

    /// Looks up a command by id.
    pub fn command(&self, cid: CommandId) -> Option<&Command> {
        self.commands.get(&cid)
    }

    /// Number of commands currently stored.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Number of task commands recorded for `tid`.
    pub fn task_command_count(&self, tid: TaskId) -> usize {
        self.by_task.get(&tid).map_or(0, Vec::len)
    }

    /// Adds the edge `depender → dependee`.
    ///
    /// Both commands must live on the same node and be distinct. The
    /// depender's `pseudo_cpl` is raised to at least `dependee.pseudo_cpl +
    /// 1` and the dependee leaves its node's execution front.
    pub fn add_dependency(
        &mut self,
        depender: CommandId,
        dependee: CommandId,
        anti: bool,
    ) -> Result<(), GraphError> {
        if depender == dependee {
            return Err(GraphError::SelfDependency(depender));
        }
        let dependee_cmd = self
            .commands
            .get(&dependee)
            .ok_or(GraphError::UnknownCommand(dependee))?;
        let (dependee_nid, dependee_pcpl) = (dependee_cmd.nid, dependee_cmd.pseudo_cpl);
        let depender_cmd = self
            .commands
            .get_mut(&depender)
            .ok_or(GraphError::UnknownCommand(depender))?;
        if depender_cmd.nid != dependee_nid {
            return Err(GraphError::CrossNodeDependency {
                depender,
                depender_nid: depender_cmd.nid,
                dependee,
                dependee_nid,
            });
        }
        depender_cmd.deps.push(Dependency { on: dependee, anti });
        depender_cmd.pseudo_cpl = depender_cmd.pseudo_cpl.max(dependee_pcpl + 1);
        let depender_pcpl = depender_cmd.pseudo_cpl;
        if let Some(front) = self.fronts.get_mut(&dependee_nid) {
            front.remove(&dependee);
        }
        self.max_pcpl = self.max_pcpl.max(depender_pcpl);
        Ok(())
    }

    /// Removes every `depender → dependee` edge (true and anti).
    ///
    /// The dependee is *not* re-inserted into the execution front: front
    /// maintenance is lossy on edge removal, and callers needing an accurate
    /// front after removals must rebuild the graph.
    pub fn remove_dependency(
        &mut self,
        depender: CommandId,
        dependee: CommandId,
    ) -> Result<(), GraphError> {
        let depender_cmd = self
            .commands
            .get_mut(&depender)
            .ok_or(GraphError::UnknownCommand(depender))?;
        depender_cmd.deps.retain(|dep| dep.on != dependee);
        Ok(())
    }

    /// Removes `cid` from all indices.
    ///
    /// Edges in other commands that reference `cid` become dangling; callers
    /// must have removed them beforehand.
    pub fn erase(&mut self, cid: CommandId) {
        let Some(cmd) = self.commands.remove(&cid) else {
            return;
        };
        if let Some(tid) = cmd.tid {
            if let Some(list) = self.by_task.get_mut(&tid) {
                list.retain(|entry| *entry != cid);
            }
        }
        if let Some(front) = self.fronts.get_mut(&cmd.nid) {
            front.remove(&cid);
        }
    }

    /// Iterates over all commands in id order.
    pub fn all_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Iterates over the task commands of `tid` in creation order.
    pub fn task_commands(&self, tid: TaskId) -> impl Iterator<Item = &Command> {
        self.by_task
            .get(&tid)
            .into_iter()
            .flatten()
            .filter_map(|cid| self.commands.get(cid))
    }

    /// Task commands of `tid` whose tag passes `pred`.
    pub fn task_commands_filtered(
        &self,
        tid: TaskId,
        pred: impl Fn(CommandTag) -> bool,
    ) -> impl Iterator<Item = &Command> {
        self.task_commands(tid).filter(move |cmd| pred(cmd.tag()))
    }

    /// The node's commands with no dependents yet. Empty set when the node
    /// has none.
    pub fn execution_front(&self, nid: NodeId) -> impl Iterator<Item = CommandId> + '_ {
        self.fronts.get(&nid).into_iter().flatten().copied()
    }

    /// Maximum `pseudo_cpl` ever observed; monotone nondecreasing.
    pub fn max_pseudo_critical_path_length(&self) -> u32 {
        self.max_pcpl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBox;
    use crate::ident::BufferId;

    fn nop(graph: &mut CommandGraph, nid: u64) -> CommandId {
        graph.create(NodeId(nid), None, CommandKind::Nop)
    }

    fn push(graph: &mut CommandGraph, nid: u64) -> CommandId {
        graph.create(
            NodeId(nid),
            None,
            CommandKind::Push {
                bid: BufferId(0),
                bx: GridBox::new([0, 0, 0], [1, 1, 1]),
                target: NodeId(1),
            },
        )
    }

    #[test]
    fn ids_are_sequential() {
        let mut graph = CommandGraph::new();
        assert_eq!(push(&mut graph, 0), CommandId(0));
        assert_eq!(push(&mut graph, 0), CommandId(1));
        assert_eq!(graph.command_count(), 2);
    }

    #[test]
    fn nop_never_enters_the_front() {
        let mut graph = CommandGraph::new();
        let n = nop(&mut graph, 0);
        let p = push(&mut graph, 0);
        let front: Vec<_> = graph.execution_front(NodeId(0)).collect();
        assert_eq!(front, vec![p]);
        assert!(graph.command(n).is_some());
    }

    #[test]
    fn dependency_chain_updates_front_and_pcpl() {
        let mut graph = CommandGraph::new();
        let c1 = push(&mut graph, 0);
        let c2 = push(&mut graph, 0);
        let c3 = push(&mut graph, 0);
        graph.add_dependency(c2, c1, false).unwrap();
        graph.add_dependency(c3, c2, false).unwrap();

        let front: Vec<_> = graph.execution_front(NodeId(0)).collect();
        assert_eq!(front, vec![c3]);
        assert_eq!(graph.max_pseudo_critical_path_length(), 3);
        assert_eq!(graph.command(c3).unwrap().pseudo_cpl(), 3);
    }

    #[test]
    fn cross_node_dependency_is_rejected() {
        let mut graph = CommandGraph::new();
        let a = push(&mut graph, 0);
        let b = push(&mut graph, 1);
        let err = graph.add_dependency(a, b, false).unwrap_err();
        assert!(matches!(err, GraphError::CrossNodeDependency { .. }));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut graph = CommandGraph::new();
        let a = push(&mut graph, 0);
        assert_eq!(
            graph.add_dependency(a, a, false),
            Err(GraphError::SelfDependency(a))
        );
    }

    #[test]
    fn anti_and_true_edges_coexist() {
        let mut graph = CommandGraph::new();
        let a = push(&mut graph, 0);
        let b = push(&mut graph, 0);
        graph.add_dependency(a, b, false).unwrap();
        graph.add_dependency(a, b, true).unwrap();
        let deps = graph.command(a).unwrap().deps();
        assert_eq!(deps.len(), 2);
        assert!(!deps[0].anti);
        assert!(deps[1].anti);
    }

    #[test]
    fn anti_dependency_removes_dependee_from_front() {
        let mut graph = CommandGraph::new();
        let a = push(&mut graph, 0);
        let b = push(&mut graph, 0);
        graph.add_dependency(a, b, true).unwrap();
        let front: Vec<_> = graph.execution_front(NodeId(0)).collect();
        assert_eq!(front, vec![a]);
    }

    #[test]
    fn remove_dependency_does_not_restore_front() {
        let mut graph = CommandGraph::new();
        let a = push(&mut graph, 0);
        let b = push(&mut graph, 0);
        graph.add_dependency(a, b, false).unwrap();
        graph.remove_dependency(a, b).unwrap();
        assert!(graph.command(a).unwrap().deps().is_empty());
        let front: Vec<_> = graph.execution_front(NodeId(0)).collect();
        assert_eq!(front, vec![a], "front is intentionally lossy on removal");
    }

    #[test]
    fn shortcut_edge_does_not_reduce_pcpl() {
        let mut graph = CommandGraph::new();
        let c1 = push(&mut graph, 0);
        let c2 = push(&mut graph, 0);
        let c3 = push(&mut graph, 0);
        graph.add_dependency(c2, c1, false).unwrap();
        graph.add_dependency(c3, c2, false).unwrap();
        // Shortcut straight to the root; pcpl stays at the longer chain.
        graph.add_dependency(c3, c1, false).unwrap();
        assert_eq!(graph.command(c3).unwrap().pseudo_cpl(), 3);
    }

    #[test]
    fn erase_removes_all_indices() {
        let mut graph = CommandGraph::new();
        let tid = TaskId(9);
        let c = graph.create(
            NodeId(0),
            Some(tid),
            CommandKind::Compute {
                sr: crate::subrange::Subrange3 {
                    offset: [0; 3],
                    range: [1; 3],
                    global_size: [1; 3],
                },
            },
        );
        assert_eq!(graph.task_command_count(tid), 1);
        graph.erase(c);
        assert_eq!(graph.task_command_count(tid), 0);
        assert!(graph.command(c).is_none());
        assert_eq!(graph.execution_front(NodeId(0)).count(), 0);
    }

    #[test]
    fn filtered_views_predicate_on_tag() {
        let mut graph = CommandGraph::new();
        let tid = TaskId(1);
        let sr = crate::subrange::Subrange3 {
            offset: [0; 3],
            range: [4; 3],
            global_size: [4; 3],
        };
        graph.create(NodeId(1), Some(tid), CommandKind::Compute { sr });
        graph.create(NodeId(0), Some(tid), CommandKind::MasterAccess);
        let computes: Vec<_> = graph
            .task_commands_filtered(tid, |tag| tag == CommandTag::Compute)
            .collect();
        assert_eq!(computes.len(), 1);
        assert_eq!(graph.task_commands(tid).count(), 2);
    }
}
