//! Type name assignment for result type descriptors.
//!
//! Descriptors are first bucketed by a cheap structural hash and then
//! compared for full structural equality within each bucket, so that
//! structurally identical shapes share one generated type name.

use std::collections::HashMap;

use crate::strings::{hash_string, make_name_not_in_set, upper_camel_case};

use super::ResultTypeDescriptor;

/// Assign a type name to each descriptor, returned parallel to the input.
/// Structurally equal descriptors get the same name; distinct shapes from
/// the same table are disambiguated with `_N` suffixes, first occurrence
/// winning the bare name.
pub fn assign_type_names(descriptors: &[ResultTypeDescriptor]) -> Vec<String> {
    let mut hash_buckets: HashMap<i64, Vec<usize>> = HashMap::new();
    for (ix, rt) in descriptors.iter().enumerate() {
        hash_buckets.entry(descriptor_hash(rt)).or_default().push(ix);
    }

    // Equality groups, ordered by each group's first appearance in the
    // input so name assignment does not depend on hash iteration order.
    let mut equality_groups: Vec<Vec<usize>> = Vec::new();
    for bucket in hash_buckets.into_values() {
        let mut bucket_groups: Vec<Vec<usize>> = Vec::new();
        for ix in bucket {
            match bucket_groups
                .iter_mut()
                .find(|grp| descriptors[grp[0]] == descriptors[ix])
            {
                Some(grp) => grp.push(ix),
                None => bucket_groups.push(vec![ix]),
            }
        }
        equality_groups.extend(bucket_groups);
    }
    equality_groups.sort_by_key(|grp| grp[0]);

    let mut taken = std::collections::HashSet::new();
    let mut names = vec![String::new(); descriptors.len()];

    for group in equality_groups {
        let name = make_name_not_in_set(&upper_camel_case(&descriptors[group[0]].table), &taken, "_");
        taken.insert(name.clone());
        for ix in group {
            names[ix] = name.clone();
        }
    }

    assert!(names.iter().all(|n| !n.is_empty()), "descriptor left unnamed");
    names
}

fn descriptor_hash(rt: &ResultTypeDescriptor) -> i64 {
    hash_string(&rt.table)
        + 3 * rt.table_field_properties.len() as i64
        + 17 * rt.parent_reference_properties.len() as i64
        + 27 * rt.child_collection_properties.len() as i64
}
