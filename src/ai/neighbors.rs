use crate::knowledge_base::{self, Entry, KnowledgeBase};

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Neighborhood size used when none is configured.
pub fn default_k(kb_size: usize) -> usize {
    ((kb_size as f64).sqrt().round() as usize).max(1)
}

/// The `k` entries closest to `query`, nearest first. Equidistant entries
/// keep their knowledge-base order. Entries at an undefined (NaN) distance
/// come after every other entry.
pub fn find_neighbors<'a>(
    kb: &'a KnowledgeBase,
    query: &[f64],
    k: usize,
) -> knowledge_base::Result<Vec<&'a Entry>> {
    if !kb.is_empty() && kb.dimension() != query.len() {
        return Err(knowledge_base::Error::CorruptKb(format!(
            "normalized features have {} components but the knowledge base has {}",
            query.len(),
            kb.dimension()
        )));
    }

    let mut distances: Vec<(f64, &Entry)> = kb
        .entries()
        .iter()
        .map(|entry| {
            let distance = euclidean_distance(query, &entry.features);
            (if distance.is_nan() { f64::INFINITY } else { distance }, entry)
        })
        .collect();
    distances.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(distances
        .into_iter()
        .take(k)
        .map(|(_, entry)| entry)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(id: &str, features: &[f64]) -> Entry {
        Entry {
            id: id.to_owned(),
            features: features.to_vec(),
            outcomes: HashMap::new(),
        }
    }

    fn ids(entries: &[&Entry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_nearest_first() {
        let kb = KnowledgeBase::from_entries([
            entry("far", &[1.0, 1.0]),
            entry("near", &[0.1, 0.0]),
            entry("mid", &[0.5, 0.5]),
        ])
        .unwrap();
        let found = find_neighbors(&kb, &[0.0, 0.0], 2).unwrap();
        assert_eq!(ids(&found), vec!["near", "mid"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let kb = KnowledgeBase::from_entries([
            entry("b", &[1.0, 0.0]),
            entry("a", &[0.0, 1.0]),
            entry("c", &[-1.0, 0.0]),
        ])
        .unwrap();
        let found = find_neighbors(&kb, &[0.0, 0.0], 3).unwrap();
        assert_eq!(ids(&found), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_nan_features_sort_last() {
        let kb = KnowledgeBase::from_entries([
            entry("unknown", &[f64::NAN, 0.0]),
            entry("far", &[1.0, 1.0]),
        ])
        .unwrap();
        let found = find_neighbors(&kb, &[0.0, 0.0], 2).unwrap();
        assert_eq!(ids(&found), vec!["far", "unknown"]);
    }

    #[test]
    fn test_k_larger_than_kb() {
        let kb = KnowledgeBase::from_entries([entry("only", &[0.0])]).unwrap();
        assert_eq!(find_neighbors(&kb, &[3.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_corrupt_kb() {
        let kb = KnowledgeBase::from_entries([entry("x", &[0.0, 0.0])]).unwrap();
        assert!(matches!(
            find_neighbors(&kb, &[0.0], 1),
            Err(knowledge_base::Error::CorruptKb(_))
        ));
    }

    #[test]
    fn test_default_k() {
        assert_eq!(default_k(0), 1);
        assert_eq!(default_k(100), 10);
        assert_eq!(default_k(2000), 45);
    }
}
