//! Lattice outputs built with `rustfst`.
//!
//! Both lattices start from one linear chain per hypothesis between a shared
//! start and final state:
//!
//! ```text
//! start --GO--> s1 --y1--> ... --yk--> sk --EOS--> final
//! ```
//!
//! Weights follow the tropical convention (negated log-probabilities). UNK
//! labels are replaced by a configurable id so they never read as epsilon.
//! The combined lattice goes through epsilon removal, determinization and
//! minimization. The sparse-tuple lattice is determinized over its own
//! semiring while the chains are merged, then minimized.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use rustfst::algorithms::determinize::determinize;
use rustfst::algorithms::minimize;
use rustfst::algorithms::rm_epsilon::rm_epsilon;
use rustfst::prelude::*;
use rustfst::{Label, StateId, Trs};

use super::{create_output_dir, lattice_err, sentence_file, OutputError};
use crate::decoder::{FullHypothesis, NBestList};
use crate::predictor::StepBreakdown;
use crate::symbols::{Symbol, EOS_ID, GO_ID, UNK_ID};

pub type StdLattice = VectorFst<TropicalWeight>;

/// Chain labels before the terminating EOS, with UNK remapped.
fn chain_labels(hypo: &FullHypothesis, unk_id: Symbol) -> Vec<Label> {
    let symbols = match hypo.symbols.split_last() {
        Some((&EOS_ID, rest)) => rest,
        _ => hypo.symbols.as_slice(),
    };
    symbols
        .iter()
        .map(|&s| if s == UNK_ID { unk_id } else { s })
        .collect()
}

fn optimize(mut fst: StdLattice) -> Result<StdLattice, OutputError> {
    rm_epsilon(&mut fst).map_err(lattice_err)?;
    let mut det: StdLattice = determinize(&fst).map_err(lattice_err)?;
    minimize(&mut det).map_err(lattice_err)?;
    Ok(det)
}

/// Adds the shared start and final states, returning `(start, final)`.
fn init_lattice(fst: &mut StdLattice) -> Result<(StateId, StateId), OutputError> {
    let start = fst.add_state();
    let final_state = fst.add_state();
    fst.set_start(start).map_err(lattice_err)?;
    fst.set_final(final_state, TropicalWeight::one())
        .map_err(lattice_err)?;
    Ok((start, final_state))
}

/// Single-weight lattice: `-total_score` sits on each path's GO arc.
pub fn build_combined_lattice(hypos: &NBestList, unk_id: Symbol) -> Result<StdLattice, OutputError> {
    let mut fst = StdLattice::new();
    let (start, final_state) = init_lattice(&mut fst)?;

    for hypo in hypos {
        let mut prev = fst.add_state();
        fst.add_tr(
            start,
            Tr::new(GO_ID, GO_ID, TropicalWeight::new(-hypo.total_score), prev),
        )
        .map_err(lattice_err)?;
        for label in chain_labels(hypo, unk_id) {
            let next = fst.add_state();
            fst.add_tr(prev, Tr::new(label, label, TropicalWeight::one(), next))
                .map_err(lattice_err)?;
            prev = next;
        }
        fst.add_tr(
            prev,
            Tr::new(EOS_ID, EOS_ID, TropicalWeight::one(), final_state),
        )
        .map_err(lattice_err)?;
    }

    optimize(fst)
}

/// Sparse-tuple weight: one tropical component per predictor holding its
/// negated score. Missing trailing components read as zero.
///
/// `plus` is the component-wise minimum, `times` the component-wise sum
/// and `divide` undoes `times`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTuple(Vec<f32>);

impl SparseTuple {
    pub fn one() -> Self {
        Self(Vec::new())
    }

    pub fn from_breakdown(step: &StepBreakdown) -> Self {
        Self(step.iter().map(|e| -e.score).collect())
    }

    pub fn components(&self) -> &[f32] {
        &self.0
    }

    pub fn is_one(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    fn zip_with(&self, other: &Self, op: impl Fn(f32, f32) -> f32) -> Self {
        let len = self.0.len().max(other.0.len());
        Self(
            (0..len)
                .map(|i| {
                    let a = self.0.get(i).copied().unwrap_or(0.0);
                    let b = other.0.get(i).copied().unwrap_or(0.0);
                    op(a, b)
                })
                .collect(),
        )
    }

    pub fn plus(&self, other: &Self) -> Self {
        self.zip_with(other, f32::min)
    }

    pub fn times(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn divide(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a - b)
    }

    /// `0,<index+1>,<value>,...` with dimension 0 as the anchor.
    pub fn to_weight_string(&self) -> String {
        let mut out = String::from("0");
        for (idx, value) in self.0.iter().enumerate() {
            out.push_str(&format!(",{},{}", idx + 1, value));
        }
        out
    }

    fn key(&self) -> Vec<u32> {
        // `+ 0.0` folds -0.0 into 0.0
        self.0.iter().map(|v| (v + 0.0).to_bits()).collect()
    }
}

/// One hypothesis as `GO y1 .. yk EOS` with a weight per arc.
struct WeightedPath {
    labels: Vec<Symbol>,
    weights: Vec<SparseTuple>,
}

impl WeightedPath {
    fn new(hypo: &FullHypothesis, unk_id: Symbol) -> Self {
        let step = |pos: usize| {
            hypo.breakdown
                .get(pos)
                .map(SparseTuple::from_breakdown)
                .unwrap_or_else(SparseTuple::one)
        };
        let chain = chain_labels(hypo, unk_id);
        let mut labels = Vec::with_capacity(chain.len() + 2);
        let mut weights = Vec::with_capacity(chain.len() + 2);
        labels.push(GO_ID);
        weights.push(SparseTuple::one());
        for (pos, &label) in chain.iter().enumerate() {
            labels.push(label);
            weights.push(step(pos));
        }
        labels.push(EOS_ID);
        weights.push(step(chain.len()));
        Self { labels, weights }
    }
}

#[derive(Default)]
struct DetState {
    arcs: Vec<(Symbol, SparseTuple, usize)>,
    final_weight: Option<SparseTuple>,
}

/// Determinizes the union of `paths` over the sparse-tuple semiring.
///
/// Paths sharing a label prefix share states. Each arc carries the `plus`
/// of what its paths need at that step; the remainder of every path is
/// carried forward as a residual and lands on later arcs or on the final
/// weight, so every path keeps its exact weight. State 0 is the start.
fn determinize_paths(paths: &[WeightedPath]) -> Vec<DetState> {
    let mut states = vec![DetState::default()];
    let mut queue: VecDeque<(usize, usize, Vec<(usize, SparseTuple)>)> = VecDeque::new();
    queue.push_back((
        0,
        0,
        (0..paths.len()).map(|p| (p, SparseTuple::one())).collect(),
    ));

    while let Some((state, depth, members)) = queue.pop_front() {
        let mut final_weight: Option<SparseTuple> = None;
        let mut groups: Vec<(Symbol, Vec<(usize, SparseTuple)>)> = Vec::new();
        for (path, residual) in members {
            let Some(&label) = paths[path].labels.get(depth) else {
                final_weight = Some(match final_weight {
                    Some(weight) => weight.plus(&residual),
                    None => residual,
                });
                continue;
            };
            let weighted = residual.times(&paths[path].weights[depth]);
            match groups.iter_mut().find(|(l, _)| *l == label) {
                Some((_, group)) => group.push((path, weighted)),
                None => groups.push((label, vec![(path, weighted)])),
            }
        }
        states[state].final_weight = final_weight;

        for (label, group) in groups {
            let Some(weight) = group.iter().map(|(_, w)| w.clone()).reduce(|a, b| a.plus(&b))
            else {
                continue;
            };
            let child = states.len();
            states.push(DetState::default());
            let residuals = group
                .into_iter()
                .map(|(path, w)| (path, w.divide(&weight)))
                .collect();
            states[state].arcs.push((label, weight, child));
            queue.push_back((child, depth + 1, residuals));
        }
    }
    states
}

#[derive(Debug, Clone, PartialEq)]
enum EncodedArc {
    Symbol(Symbol, SparseTuple),
    /// Marks its source state final with the given weight.
    Final(SparseTuple),
}

#[derive(Default)]
struct ArcEncoder {
    arcs: Vec<EncodedArc>,
    index: HashMap<(Option<Symbol>, Vec<u32>), Label>,
}

impl ArcEncoder {
    fn encode(&mut self, arc: EncodedArc) -> Label {
        let key = match &arc {
            EncodedArc::Symbol(label, weight) => (Some(*label), weight.key()),
            EncodedArc::Final(weight) => (None, weight.key()),
        };
        if let Some(&encoded) = self.index.get(&key) {
            return encoded;
        }
        self.arcs.push(arc);
        let encoded = self.arcs.len() as Label;
        self.index.insert(key, encoded);
        encoded
    }
}

/// Sparse-tuple lattice held as an encoded acceptor.
///
/// Each distinct (label, tuple) pair and each distinct final weight is
/// mapped to one acceptor label so the structure can be minimized with
/// plain tropical algorithms; final weights become arcs into one extra
/// state. `arcs` decodes acceptor label `k` as `arcs[k - 1]`.
pub struct SparseLattice {
    fst: StdLattice,
    arcs: Vec<EncodedArc>,
}

/// Builds the sparse-tuple lattice of `hypos`: deterministic on symbols,
/// then minimized.
pub fn build_sparse_lattice(hypos: &NBestList, unk_id: Symbol) -> Result<SparseLattice, OutputError> {
    let paths: Vec<WeightedPath> = hypos.iter().map(|h| WeightedPath::new(h, unk_id)).collect();
    let det = determinize_paths(&paths);

    let mut fst = StdLattice::new();
    let mut encoder = ArcEncoder::default();
    let ids: Vec<StateId> = det.iter().map(|_| fst.add_state()).collect();
    if let Some(&start) = ids.first() {
        fst.set_start(start).map_err(lattice_err)?;
    }

    let mut super_final: Option<StateId> = None;
    for (state, node) in det.iter().enumerate() {
        for (label, weight, child) in &node.arcs {
            let encoded = encoder.encode(EncodedArc::Symbol(*label, weight.clone()));
            fst.add_tr(
                ids[state],
                Tr::new(encoded, encoded, TropicalWeight::one(), ids[*child]),
            )
            .map_err(lattice_err)?;
        }
        if let Some(weight) = &node.final_weight {
            let target = match super_final {
                Some(target) => target,
                None => {
                    let target = fst.add_state();
                    fst.set_final(target, TropicalWeight::one())
                        .map_err(lattice_err)?;
                    super_final = Some(target);
                    target
                }
            };
            let encoded = encoder.encode(EncodedArc::Final(weight.clone()));
            fst.add_tr(
                ids[state],
                Tr::new(encoded, encoded, TropicalWeight::one(), target),
            )
            .map_err(lattice_err)?;
        }
    }

    minimize(&mut fst).map_err(lattice_err)?;
    Ok(SparseLattice {
        fst,
        arcs: encoder.arcs,
    })
}

impl SparseLattice {
    fn decode(&self, label: Label) -> Result<&EncodedArc, OutputError> {
        self.arcs
            .get((label as usize).wrapping_sub(1))
            .ok_or_else(|| OutputError::Lattice(format!("unknown arc label {}", label)))
    }

    /// Lattice states in breadth-first order from the start, without the
    /// extra state that final weights are encoded into.
    fn ordered_states(&self) -> Result<Vec<StateId>, OutputError> {
        let Some(start) = self.fst.start() else {
            return Ok(Vec::new());
        };
        let mut order = vec![start];
        let mut seen = HashSet::from([start]);
        let mut next = 0;
        while let Some(&state) = order.get(next) {
            next += 1;
            let trs = self.fst.get_trs(state).map_err(lattice_err)?;
            for tr in trs.trs() {
                if matches!(self.decode(tr.ilabel)?, EncodedArc::Symbol(..))
                    && seen.insert(tr.nextstate)
                {
                    order.push(tr.nextstate);
                }
            }
        }
        Ok(order)
    }

    pub fn num_states(&self) -> usize {
        self.ordered_states().map(|order| order.len()).unwrap_or(0)
    }

    /// AT&T text form with states renumbered breadth-first, so the start
    /// state is 0 and comes first. Readable by
    /// `fstcompile --arc_type=tropicalsparsetuple`.
    pub fn to_att_text(&self) -> Result<String, OutputError> {
        let order = self.ordered_states()?;
        let index: HashMap<StateId, usize> =
            order.iter().enumerate().map(|(i, &s)| (s, i)).collect();

        let mut arcs = String::new();
        let mut finals = String::new();
        for (idx, &state) in order.iter().enumerate() {
            let trs = self.fst.get_trs(state).map_err(lattice_err)?;
            for tr in trs.trs() {
                match self.decode(tr.ilabel)? {
                    EncodedArc::Symbol(label, weight) => {
                        let target = index.get(&tr.nextstate).ok_or_else(|| {
                            OutputError::Lattice(format!("unreachable state {}", tr.nextstate))
                        })?;
                        arcs.push_str(&format!("{idx}\t{target}\t{label}\t{label}"));
                        if !weight.is_one() {
                            arcs.push('\t');
                            arcs.push_str(&weight.to_weight_string());
                        }
                        arcs.push('\n');
                    }
                    EncodedArc::Final(weight) => {
                        finals.push_str(&idx.to_string());
                        if !weight.is_one() {
                            finals.push('\t');
                            finals.push_str(&weight.to_weight_string());
                        }
                        finals.push('\n');
                    }
                }
            }
        }
        arcs.push_str(&finals);
        Ok(arcs)
    }
}

/// Writes `<dir>/<n>.fst.txt` per sentence.
pub struct SparseLatticeOutput {
    dir: PathBuf,
    unk_id: Symbol,
}

impl SparseLatticeOutput {
    pub fn new(dir: PathBuf, unk_id: Symbol) -> Self {
        Self { dir, unk_id }
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        create_output_dir(&self.dir, "FST")?;
        for (&sen_idx, hypos) in sen_indices.iter().zip(all_hypos) {
            let lattice = build_sparse_lattice(hypos, self.unk_id)?;
            let path = sentence_file(&self.dir, sen_idx, "fst.txt");
            std::fs::write(&path, lattice.to_att_text()?)?;
            log::debug!(
                "Wrote sparse tuple lattice with {} states to {}",
                lattice.num_states(),
                path.display()
            );
        }
        Ok(())
    }
}

/// Writes `<dir>/<n>.fst` per sentence in the OpenFst binary format.
pub struct CombinedLatticeOutput {
    dir: PathBuf,
    unk_id: Symbol,
}

impl CombinedLatticeOutput {
    pub fn new(dir: PathBuf, unk_id: Symbol) -> Self {
        Self { dir, unk_id }
    }

    pub fn write_hypos(
        &mut self,
        all_hypos: &[NBestList],
        sen_indices: &[usize],
    ) -> Result<(), OutputError> {
        create_output_dir(&self.dir, "FST")?;
        for (&sen_idx, hypos) in sen_indices.iter().zip(all_hypos) {
            let fst = build_combined_lattice(hypos, self.unk_id)?;
            let path = sentence_file(&self.dir, sen_idx, "fst");
            fst.write(&path).map_err(lattice_err)?;
            log::debug!(
                "Wrote lattice with {} states to {}",
                fst.num_states(),
                path.display()
            );
        }
        Ok(())
    }
}
