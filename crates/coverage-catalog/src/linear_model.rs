//! Linear models: weighted sums of descriptor products.
//!
//! A model computes a target series as `Σ cᵢ · Π dᵢⱼ`. Terms whose
//! descriptor multisets are equal are collected into one, and virtual
//! descriptors can be expanded in place with `substitute`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use catalog_store::CatalogStore;
use coverage_common::{CatalogError, CatalogResult};

use crate::descriptor::{Descriptor, DescriptorTable};

/// One monomial: a coefficient times an ordered list of descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    coefficient: f64,
    descriptors: Vec<Arc<Descriptor>>,
}

impl Term {
    /// Build a term. Identity descriptors are dropped since they are valued 1.
    pub fn new(coefficient: f64, descriptors: Vec<Arc<Descriptor>>) -> Self {
        Self {
            coefficient,
            descriptors: descriptors.into_iter().filter(|d| !d.is_identity()).collect(),
        }
    }

    pub fn constant(coefficient: f64) -> Self {
        Self::new(coefficient, Vec::new())
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub fn descriptors(&self) -> &[Arc<Descriptor>] {
        &self.descriptors
    }

    pub fn contains(&self, descriptor: &Descriptor) -> bool {
        self.descriptors.iter().any(|d| **d == *descriptor)
    }

    fn count(&self, descriptor: &Descriptor) -> usize {
        self.descriptors.iter().filter(|d| ***d == *descriptor).count()
    }

    /// True when both terms multiply the same descriptors, in any order.
    fn same_monomial(&self, other: &Term) -> bool {
        self.descriptors.len() == other.descriptors.len()
            && self.descriptors.iter().all(|d| self.count(d) == other.count(d))
    }

    /// Replace every occurrence of `descriptor` by the sum of `expansion`.
    ///
    /// Descriptors keep their left-to-right order. Like partial products are
    /// merged after each occurrence, so `x^n` over a k-term sum stays polynomial in n.
    fn expand(&self, descriptor: &Descriptor, expansion: &[Term]) -> Vec<Term> {
        let mut partial = vec![Term {
            coefficient: self.coefficient,
            descriptors: Vec::with_capacity(self.descriptors.len()),
        }];
        for d in &self.descriptors {
            if **d != *descriptor {
                for p in &mut partial {
                    p.descriptors.push(d.clone());
                }
                continue;
            }
            let mut next: Vec<Term> = Vec::with_capacity(partial.len() * expansion.len());
            for p in &partial {
                for e in expansion {
                    let mut descriptors = p.descriptors.clone();
                    descriptors.extend(e.descriptors.iter().cloned());
                    let product = Term::new(p.coefficient * e.coefficient, descriptors);
                    match next.iter_mut().find(|t| t.same_monomial(&product)) {
                        Some(like) => like.coefficient += product.coefficient,
                        None => next.push(product),
                    }
                }
            }
            partial = next;
        }
        partial
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coefficient)?;
        for descriptor in &self.descriptors {
            write!(f, "⋅{}", descriptor)?;
        }
        Ok(())
    }
}

/// Positions of each term's descriptors in the distinct descriptor list.
#[derive(Debug, Clone)]
struct DescriptorIndex {
    descriptors: Vec<Arc<Descriptor>>,
    positions: Vec<Vec<usize>>,
}

impl DescriptorIndex {
    fn build(terms: &[Term]) -> Self {
        let mut descriptors: Vec<Arc<Descriptor>> = Vec::new();
        let mut lookup: HashMap<Arc<Descriptor>, usize> = HashMap::new();
        let positions = terms
            .iter()
            .map(|term| {
                term.descriptors
                    .iter()
                    .map(|d| {
                        *lookup.entry(d.clone()).or_insert_with(|| {
                            descriptors.push(d.clone());
                            descriptors.len() - 1
                        })
                    })
                    .collect()
            })
            .collect();
        Self {
            descriptors,
            positions,
        }
    }
}

/// A polynomial over descriptors computing one target series.
#[derive(Debug, Clone)]
pub struct LinearModel {
    target: String,
    terms: Vec<Term>,
    index: OnceLock<DescriptorIndex>,
}

impl LinearModel {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            terms: Vec::new(),
            index: OnceLock::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Add a term, summing coefficients with an existing like term.
    pub fn add(&mut self, term: Term) {
        self.index = OnceLock::new();
        match self.terms.iter_mut().find(|t| t.same_monomial(&term)) {
            Some(existing) => existing.coefficient += term.coefficient,
            None => self.terms.push(term),
        }
    }

    /// Replace every occurrence of `descriptor` by the sum of `expansion`.
    pub fn substitute(&mut self, descriptor: &Descriptor, expansion: &[Term]) -> CatalogResult<()> {
        if expansion.iter().any(|t| t.contains(descriptor)) {
            return Err(CatalogError::Recursion(descriptor.name.clone()));
        }
        if !descriptor.distribution.is_identity() {
            return Err(CatalogError::UnsupportedDistribution(descriptor.name.clone()));
        }
        if let Some(d) = expansion
            .iter()
            .flat_map(|t| t.descriptors.iter())
            .find(|d| !d.distribution.is_identity())
        {
            return Err(CatalogError::UnsupportedDistribution(d.name.clone()));
        }

        let mut expanded = LinearModel::new(self.target.clone());
        for term in &self.terms {
            if term.contains(descriptor) {
                for product in term.expand(descriptor, expansion) {
                    expanded.add(product);
                }
            } else {
                expanded.add(term.clone());
            }
        }
        self.terms = expanded.terms;
        self.index = OnceLock::new();
        debug!(target = %self.target, descriptor = %descriptor, terms = self.terms.len(), "Substituted descriptor");
        Ok(())
    }

    /// Apply several substitutions until none of their descriptors remain.
    ///
    /// Fails with `Recursion` when the expansions refer to each other in a cycle.
    pub fn substitute_all(&mut self, expansions: &[(Arc<Descriptor>, Vec<Term>)]) -> CatalogResult<()> {
        check_acyclic(expansions)?;
        let mut passes = 0;
        loop {
            let mut changed = false;
            for (descriptor, expansion) in expansions {
                if self.terms.iter().any(|t| t.contains(descriptor)) {
                    self.substitute(descriptor, expansion)?;
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
            passes += 1;
            if passes > expansions.len() {
                let name = expansions.first().map(|(d, _)| d.name.clone()).unwrap_or_default();
                return Err(CatalogError::Recursion(name));
            }
        }
    }

    /// Distinct descriptors in order of first appearance.
    pub fn descriptors(&self) -> &[Arc<Descriptor>] {
        &self.index().descriptors
    }

    /// Evaluate with one value per entry of `descriptors()`.
    pub fn evaluate(&self, values: &[f64]) -> CatalogResult<f64> {
        let index = self.index();
        if values.len() != index.descriptors.len() {
            return Err(CatalogError::InvalidArgument(format!(
                "model '{}' expects {} values, got {}",
                self.target,
                index.descriptors.len(),
                values.len()
            )));
        }
        Ok(self.combine(index, values))
    }

    /// Evaluate by sampling each distinct descriptor once, in index order.
    pub fn evaluate_with<E, F>(&self, mut sample: F) -> Result<f64, E>
    where
        F: FnMut(&Descriptor) -> Result<f64, E>,
    {
        let index = self.index();
        let values = index
            .descriptors
            .iter()
            .map(|d| sample(d))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(self.combine(index, &values))
    }

    fn index(&self) -> &DescriptorIndex {
        self.index.get_or_init(|| DescriptorIndex::build(&self.terms))
    }

    fn combine(&self, index: &DescriptorIndex, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .zip(&index.positions)
            .map(|(term, positions)| term.coefficient * positions.iter().map(|&i| values[i]).product::<f64>())
            .sum()
    }
}

impl fmt::Display for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} =", self.target)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " +")?;
            }
            write!(f, " {}", term)?;
        }
        Ok(())
    }
}

/// Depth-first search for a cycle among the expanded descriptors.
fn check_acyclic(expansions: &[(Arc<Descriptor>, Vec<Term>)]) -> CatalogResult<()> {
    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        visiting: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
    ) -> Option<usize> {
        if done.contains(&node) {
            return None;
        }
        if !visiting.insert(node) {
            return Some(node);
        }
        for &next in &edges[node] {
            if let Some(cycle) = visit(next, edges, visiting, done) {
                return Some(cycle);
            }
        }
        visiting.remove(&node);
        done.insert(node);
        None
    }

    let edges: Vec<Vec<usize>> = expansions
        .iter()
        .map(|(_, expansion)| {
            expansions
                .iter()
                .enumerate()
                .filter(|(_, (d, _))| expansion.iter().any(|t| t.contains(d)))
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    for node in 0..expansions.len() {
        if let Some(cycle) = visit(node, &edges, &mut visiting, &mut done) {
            return Err(CatalogError::Recursion(expansions[cycle].0.name.clone()));
        }
    }
    Ok(())
}

/// Loads linear models from the catalog store.
pub struct LinearModelTable {
    store: Arc<dyn CatalogStore>,
    descriptors: DescriptorTable,
}

impl LinearModelTable {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            descriptors: DescriptorTable::new(store.clone()).lenient(),
            store,
        }
    }

    /// Get the model computing `target`, or `None` when the series has none.
    pub async fn model(&self, target: &str) -> CatalogResult<Option<LinearModel>> {
        let rows = self.store.linear_model(target).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut model = LinearModel::new(target);
        for row in rows {
            let mut descriptors = Vec::with_capacity(row.descriptors.len());
            for name in &row.descriptors {
                descriptors.push(self.descriptors.get(name).await?);
            }
            model.add(Term::new(row.coefficient, descriptors));
        }
        debug!(target, terms = model.terms.len(), "Loaded linear model");
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Distribution, LocationOffset};

    fn descriptor(name: &str) -> Arc<Descriptor> {
        Arc::new(Descriptor {
            name: name.to_string(),
            phenomenon: name.to_uppercase(),
            procedure: "L3".to_string(),
            band: 1,
            offset: LocationOffset::default(),
            distribution: Distribution::Normal,
        })
    }

    #[test]
    fn test_add_collects_like_terms() {
        let (a, b) = (descriptor("a"), descriptor("b"));
        let mut model = LinearModel::new("y");
        model.add(Term::new(2.0, vec![a.clone(), b.clone()]));
        model.add(Term::new(3.0, vec![b.clone(), a.clone()]));
        model.add(Term::new(1.0, vec![a.clone()]));

        assert_eq!(model.terms().len(), 2);
        assert_eq!(model.terms()[0].coefficient(), 5.0);
        assert_eq!(model.descriptors().len(), 2);
        assert_eq!(model.evaluate(&[2.0, 3.0]).unwrap(), 5.0 * 6.0 + 2.0);
    }

    #[test]
    fn test_index_follows_first_appearance() {
        let (a, b, c) = (descriptor("a"), descriptor("b"), descriptor("c"));
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![c.clone()]));
        model.add(Term::new(1.0, vec![a.clone(), c.clone()]));
        model.add(Term::new(1.0, vec![b.clone()]));

        let names: Vec<_> = model.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn test_evaluate_rejects_wrong_length() {
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![descriptor("a")]));
        assert!(matches!(model.evaluate(&[]), Err(CatalogError::InvalidArgument(_))));
    }

    #[test]
    fn test_constant_term() {
        let mut model = LinearModel::new("y");
        model.add(Term::new(4.0, vec![Arc::new(Descriptor::identity())]));
        model.add(Term::constant(1.0));
        assert_eq!(model.terms().len(), 1);
        assert_eq!(model.evaluate(&[]).unwrap(), 5.0);
    }

    #[test]
    fn test_substitute_expands_products() {
        let (x, u, v) = (descriptor("x"), descriptor("u"), descriptor("v"));
        // y = 2·x·x with x = u + 3·v
        let mut model = LinearModel::new("y");
        model.add(Term::new(2.0, vec![x.clone(), x.clone()]));
        model
            .substitute(&x, &[Term::new(1.0, vec![u.clone()]), Term::new(3.0, vec![v.clone()])])
            .unwrap();

        assert!(model.terms().iter().all(|t| !t.contains(&x)));
        assert_eq!(model.terms().len(), 3);
        let value = model
            .evaluate_with(|d| -> Result<f64, ()> { Ok(if d.name == "u" { 2.0 } else { 5.0 }) })
            .unwrap();
        let expected = 2.0 * (2.0 + 3.0 * 5.0) * (2.0 + 3.0 * 5.0);
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_substitute_rejects_self_reference() {
        let (x, u) = (descriptor("x"), descriptor("u"));
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![x.clone()]));
        let result = model.substitute(&x, &[Term::new(1.0, vec![u, x.clone()])]);
        assert!(matches!(result, Err(CatalogError::Recursion(name)) if name == "x"));
    }

    #[test]
    fn test_substitute_rejects_transitive_cycle() {
        let (a, b) = (descriptor("a"), descriptor("b"));
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![a.clone()]));
        let expansions = vec![
            (a.clone(), vec![Term::new(2.0, vec![b.clone()])]),
            (b.clone(), vec![Term::new(0.5, vec![a.clone()])]),
        ];
        assert!(matches!(model.substitute_all(&expansions), Err(CatalogError::Recursion(_))));
    }

    #[test]
    fn test_substitute_all_chains() {
        let (a, b, c) = (descriptor("a"), descriptor("b"), descriptor("c"));
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![a.clone()]));
        let expansions = vec![
            (a.clone(), vec![Term::new(2.0, vec![b.clone()])]),
            (b.clone(), vec![Term::new(3.0, vec![c.clone()])]),
        ];
        model.substitute_all(&expansions).unwrap();
        assert_eq!(model.terms().len(), 1);
        assert_eq!(model.terms()[0].coefficient(), 6.0);
        assert_eq!(model.descriptors()[0].name, "c");
    }

    #[test]
    fn test_substitute_rejects_non_identity_distribution() {
        let x = descriptor("x");
        let mut log = (*descriptor("chl")).clone();
        log.distribution = Distribution::LogNormal;
        let mut model = LinearModel::new("y");
        model.add(Term::new(1.0, vec![x.clone()]));
        let result = model.substitute(&x, &[Term::new(1.0, vec![Arc::new(log)])]);
        assert!(matches!(result, Err(CatalogError::UnsupportedDistribution(name)) if name == "chl"));
    }

    #[test]
    fn test_display() {
        let mut model = LinearModel::new("pp");
        model.add(Term::new(0.5, vec![descriptor("sst")]));
        model.add(Term::constant(2.0));
        assert_eq!(model.to_string(), "pp = 0.5⋅sst + 2");
    }
}
