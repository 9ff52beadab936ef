use crate::{
    index::{segment::LogFileId, tree::IndexTree, LogSegment},
    ir::{Node, Value},
    path::{KPath, Segment},
    schema::Schema,
};

/// Everything about a commit that every [LogSegment] emitted while indexing
/// its patch shares.
#[derive(Debug, Clone)]
pub struct IndexWriteParams {
    pub start_commit: u64,
    pub end_commit: u64,
    pub start_tx: u64,
    pub end_tx: u64,
    pub log_file: LogFileId,
    pub log_position: u64,
    pub log_file_generation: u64,
    pub scope_id: Option<String>,
}

/// Walk a patch's IR recursively, inserting one [LogSegment] per visited
/// node — container and leaf alike — into `tree`.
pub fn index_patch(tree: &IndexTree, schema: &Schema, patch: &Value, params: &IndexWriteParams) {
    walk(tree, schema, &KPath::root(), patch, params, None, None);
}

fn walk(
    tree: &IndexTree,
    schema: &Schema,
    path: &KPath,
    value: &Value,
    params: &IndexWriteParams,
    array_key: Option<String>,
    array_key_field: Option<String>,
) {
    tree.insert(LogSegment {
        kinded_path: path.clone(),
        start_commit: params.start_commit,
        end_commit: params.end_commit,
        start_tx: params.start_tx,
        end_tx: params.end_tx,
        log_file: params.log_file,
        log_position: params.log_position,
        log_file_generation: params.log_file_generation,
        scope_id: params.scope_id.clone(),
        array_key,
        array_key_field,
    });

    match &value.node {
        Node::Object(fields) => {
            for (k, v) in fields {
                let child = path.push(Segment::Field(k.clone()));
                walk(tree, schema, &child, v, params, None, None);
            }
        }
        Node::SparseArray(items) => {
            for (n, v) in items {
                let child = path.push(Segment::Sparse(*n));
                walk(tree, schema, &child, v, params, None, None);
            }
        }
        Node::Array(items) => {
            let key_field = value
                .tag
                .as_ref()
                .filter(|t| t.name == "key")
                .and_then(|t| t.args.first().cloned())
                .or_else(|| schema.key_field_for(path).map(str::to_string));

            for (i, v) in items.iter().enumerate() {
                match &key_field {
                    Some(field) => {
                        let key_val = field_value_as_string(v, field);
                        let child = path.push(Segment::Keyed(key_val.clone()));
                        walk(tree, schema, &child, v, params, key_val, Some(field.clone()));
                    }
                    None => {
                        let child = path.push(Segment::Dense(i as u64));
                        walk(tree, schema, &child, v, params, None, None);
                    }
                }
            }
        }
        Node::String(_) | Node::Int(_) | Node::Float(_) | Node::Bool(_) | Node::Null => {}
    }
}

fn field_value_as_string(element: &Value, field: &str) -> Option<String> {
    match &element.node {
        Node::Object(fields) => fields.iter().find(|(k, _)| k == field).and_then(|(_, v)| match &v.node {
            Node::String(s) => Some(s.clone()),
            Node::Int(n) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
#[path = "walk_test.rs"]
mod walk_test;
