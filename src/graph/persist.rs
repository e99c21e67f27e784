//! Turtle persistence for the knowledge graph.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never sees a partially written graph.

use std::io::BufReader;
use std::path::Path;

use oxigraph::io::{RdfFormat, RdfSerializer};
use oxigraph::model::{Graph, GraphNameRef, Triple};
use oxigraph::store::Store;

use crate::error::{GraphError, GraphResult};

use super::PREFIXES;

fn turtle_serializer() -> GraphResult<RdfSerializer> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (name, iri) in PREFIXES {
        serializer = serializer
            .with_prefix(*name, *iri)
            .map_err(|e| GraphError::Store {
                message: format!("invalid prefix {name}: {e}"),
            })?;
    }
    Ok(serializer)
}

fn store_from_graph(graph: &Graph) -> GraphResult<Store> {
    let store = Store::new().map_err(|e| GraphError::Store {
        message: format!("failed to create oxigraph store: {e}"),
    })?;
    for triple in graph.iter() {
        store
            .insert(triple.in_graph(GraphNameRef::DefaultGraph))
            .map_err(|e| GraphError::Store {
                message: format!("insert failed: {e}"),
            })?;
    }
    Ok(store)
}

/// Render the graph as Turtle with the standard prefixes bound.
pub fn to_turtle_string(graph: &Graph) -> GraphResult<String> {
    let store = store_from_graph(graph)?;
    let mut buffer = Vec::new();
    store
        .dump_graph_to_writer(GraphNameRef::DefaultGraph, turtle_serializer()?, &mut buffer)
        .map_err(|e| GraphError::Serialize {
            path: "<memory>".into(),
            message: e.to_string(),
        })?;
    String::from_utf8(buffer).map_err(|e| GraphError::Serialize {
        path: "<memory>".into(),
        message: format!("invalid UTF-8 in Turtle output: {e}"),
    })
}

/// Serialize to `path` atomically.
pub fn serialize(graph: &Graph, path: &Path) -> GraphResult<()> {
    let turtle = to_turtle_string(graph).map_err(|e| match e {
        GraphError::Serialize { message, .. } => GraphError::Serialize {
            path: path.display().to_string(),
            message,
        },
        other => other,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GraphError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    crate::paths::write_atomic(path, turtle.as_bytes()).map_err(|e| GraphError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), triples = graph.len(), "knowledge graph written");
    Ok(())
}

/// Load a Turtle file into a fresh in-memory store.
pub fn load_store(path: &Path) -> GraphResult<Store> {
    let file = std::fs::File::open(path).map_err(|e| GraphError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let store = Store::new().map_err(|e| GraphError::Store {
        message: format!("failed to create oxigraph store: {e}"),
    })?;
    store
        .load_from_reader(RdfFormat::Turtle, BufReader::new(file))
        .map_err(|e| GraphError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(store)
}

/// Load a Turtle file back into a triple set.
pub fn load(path: &Path) -> GraphResult<Graph> {
    let store = load_store(path)?;
    let mut graph = Graph::new();
    for quad in store.quads_for_pattern(None, None, None, Some(GraphNameRef::DefaultGraph)) {
        let quad = quad.map_err(|e| GraphError::Store {
            message: format!("read failed: {e}"),
        })?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}
