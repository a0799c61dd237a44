//! Organ consistency check across snippets of one query

use symloc_common::models::RetrievedSnippet;

/// Snippets that name the same organ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganGroup {
    pub organ_name: String,

    /// Indices into the input slice, input order
    pub snippet_indices: Vec<usize>,
}

impl OrganGroup {
    pub fn support(&self) -> usize {
        self.snippet_indices.len()
    }
}

/// Snippets grouped by organ name
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    /// Groups in first-encountered order
    pub groups: Vec<OrganGroup>,

    /// Snippets carrying no organ name
    pub unlabeled: Vec<usize>,
}

impl ConsistencyReport {
    /// At most one distinct organ across the snippets
    pub fn is_consistent(&self) -> bool {
        self.groups.len() <= 1
    }

    /// Group with the most supporting snippets; ties go to the first encountered
    pub fn dominant(&self) -> Option<&OrganGroup> {
        let mut best: Option<&OrganGroup> = None;
        for group in &self.groups {
            match best {
                Some(current) if group.support() <= current.support() => {}
                _ => best = Some(group),
            }
        }
        best
    }

    /// Dominant group has strictly more support than every other group
    pub fn has_clear_majority(&self) -> bool {
        let Some(dominant) = self.dominant() else {
            return false;
        };
        self.groups
            .iter()
            .filter(|g| g.organ_name != dominant.organ_name)
            .all(|g| g.support() < dominant.support())
    }

    /// Organ names other than the dominant one, first-encountered order
    pub fn losing_organs(&self) -> Vec<String> {
        let dominant = self.dominant().map(|g| g.organ_name.as_str());
        self.groups
            .iter()
            .filter(|g| Some(g.organ_name.as_str()) != dominant)
            .map(|g| g.organ_name.clone())
            .collect()
    }
}

/// Group snippets by organ name (trimmed, case-sensitive)
pub fn group_by_organ(snippets: &[RetrievedSnippet]) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();

    for (index, snippet) in snippets.iter().enumerate() {
        let organ = snippet.organ_name.trim();
        if organ.is_empty() {
            report.unlabeled.push(index);
            continue;
        }

        match report.groups.iter_mut().find(|g| g.organ_name == organ) {
            Some(group) => group.snippet_indices.push(index),
            None => report.groups.push(OrganGroup {
                organ_name: organ.to_string(),
                snippet_indices: vec![index],
            }),
        }
    }

    report
}
