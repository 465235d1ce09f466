// SPDX-License-Identifier: Apache-2.0
//! Deterministic emission order for built commands.

use crate::command::{Command, CommandTag};
use crate::command_graph::CommandGraph;

/// Linearizes the graph for emission to the nodes.
///
/// Commands are ordered by ascending `(pseudo_cpl, cid)`, which is
/// consistent with a breadth-first walk from the synthetic root: every
/// dependency edge is added while the dependee's `pseudo_cpl` is strictly
/// below the depender's, so a dependee always precedes its dependers.
/// `Nop` join points are skipped entirely; shutdown commands sort behind
/// everything else regardless of depth.
pub fn flush_order(graph: &CommandGraph) -> Vec<&Command> {
    let mut commands: Vec<&Command> = graph
        .all_commands()
        .filter(|cmd| cmd.tag() != CommandTag::Nop)
        .collect();
    commands.sort_by_key(|cmd| {
        (
            cmd.tag() == CommandTag::Shutdown,
            cmd.pseudo_cpl(),
            cmd.cid(),
        )
    });
    commands
}
