//! Export of the object inheritance graph in Graphviz DOT format.
//!
//! Enabled with the `dot` cargo feature.  Every declared object becomes
//! a node, every declared parent relation an edge; patch relations are
//! drawn as dashed edges towards the target.

use std::io::{self, Write};

use dot_writer::{Attributes, DotWriter, Style};
use itertools::Itertools;

use crate::database::Database;

/// Write the inheritance graph of a loaded database.
pub fn export_inheritance(database: &Database, out: &mut impl Write) -> io::Result<()> {
    let mut bytes = Vec::new();
    {
        let mut writer = DotWriter::from(&mut bytes);
        let mut graph = writer.digraph();

        // deterministic output: sort objects by name
        for fqon in database.info().objects().keys().sorted() {
            let node_id = format!("{:?}", fqon);
            graph.node_named(node_id.clone());

            if let Some(state) = database.initial_state().get(fqon) {
                for parent in state.parents() {
                    graph.edge(node_id.clone(), format!("{:?}", parent));
                }
            }

            let info = database.info().object(fqon);
            if let Some(patch) = info.and_then(|info| info.patch()) {
                graph
                    .edge(node_id.clone(), format!("{:?}", patch.target()))
                    .attributes()
                    .set_style(Style::Dashed);
            }
        }
    }
    out.write_all(&bytes)
}
