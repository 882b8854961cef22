//! Python bindings (feature `python`, §B.1): thin `pyclass` wrappers around
//! the core engine's handles plus `pyfunction`s for channel construction,
//! MPO/MPS assembly, running DMRG/TDVP, and reading observables back out —
//! the same shape the teacher crate exposes its spinwave calculation at
//! (`rotations`/`couplings` in, `PyArray1<f64>` out), generalized to this
//! engine's compile → run → observe boundary.
use numpy::{PyArray1, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rand::SeedableRng;

use crate::callback::{RunCallback, SweepReport};
use crate::channel::{Channel, Species};
use crate::error::TnCoreError;
use crate::fsm::build_fsm;
use crate::mpo::{build_mpo, Mpo};
use crate::mps::{Mps, SitePattern};
use crate::observables;
use crate::runtime::RuntimeContext;
use crate::scalar::ScalarKind;
use crate::site::{site_table, OperatorSymbol, SiteChain, SiteKind};
use crate::solvers::EvolutionKind;
use crate::sweep::{run_dmrg, run_tdvp, DmrgOptions, StopFlag, TdvpOptions};
use crate::C64;

fn to_py_err(e: TnCoreError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_species(s: &str) -> PyResult<Species> {
    match s {
        "spin" => Ok(Species::Spin),
        "boson" => Ok(Species::Boson),
        other => Err(PyValueError::new_err(format!("unknown species '{other}'"))),
    }
}

fn parse_operator(s: &str) -> PyResult<OperatorSymbol> {
    use OperatorSymbol::*;
    Ok(match s {
        "I" => Id,
        "X" => X,
        "Y" => Y,
        "Z" => Z,
        "S+" => SPlus,
        "S-" => SMinus,
        "A" => A,
        "Adag" => ADag,
        "N" => N,
        other => return Err(PyValueError::new_err(format!("unknown operator symbol '{other}'"))),
    })
}

/// A site chain plus its operator-table runtime context (§A.4.1), built from
/// `[("spin", 0.5), ("boson", 4.0), ...]`.
#[pyclass(name = "SiteChain")]
pub struct PySiteChain {
    pub(crate) chain: SiteChain,
    pub(crate) ctx: RuntimeContext,
}

#[pymethods]
impl PySiteChain {
    #[new]
    fn new(sites: Vec<(String, f64)>) -> PyResult<PySiteChain> {
        let mut kinds = Vec::with_capacity(sites.len());
        for (kind, param) in sites {
            let site = match kind.as_str() {
                "spin" => SiteKind::spin(param).map_err(to_py_err)?,
                "boson" => SiteKind::boson(param.round() as usize).map_err(to_py_err)?,
                other => return Err(PyValueError::new_err(format!("unknown site kind '{other}'"))),
            };
            kinds.push(site);
        }
        Ok(PySiteChain {
            chain: SiteChain::new(kinds),
            ctx: RuntimeContext::new(),
        })
    }

    fn __len__(&self) -> usize {
        self.chain.len()
    }
}

/// An opaque channel-IR value (§A.3); constructed by the module-level
/// `*_channel` functions below and collected into a list for [`compile_mpo`].
#[pyclass(name = "Channel", frozen)]
#[derive(Clone)]
pub struct PyChannel {
    pub(crate) inner: Channel,
}

#[pyfunction]
fn field_channel(species: &str, op: &str, w_re: f64, w_im: f64) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::Field {
            species: parse_species(species)?,
            op: parse_operator(op)?,
            w: C64::new(w_re, w_im),
        },
    })
}

#[pyfunction]
fn finite_range_coupling(species: &str, op_a: &str, op_b: &str, delta: usize, w_re: f64, w_im: f64) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::FiniteRangeCoupling {
            species: parse_species(species)?,
            op_a: parse_operator(op_a)?,
            op_b: parse_operator(op_b)?,
            delta,
            w: C64::new(w_re, w_im),
        },
    })
}

#[pyfunction]
#[allow(clippy::too_many_arguments)]
fn exp_channel_coupling(
    species: &str,
    op_a: &str,
    op_b: &str,
    amp_re: f64,
    amp_im: f64,
    lambda_re: f64,
    lambda_im: f64,
) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::ExpChannelCoupling {
            species: parse_species(species)?,
            op_a: parse_operator(op_a)?,
            op_b: parse_operator(op_b)?,
            amp: C64::new(amp_re, amp_im),
            lambda: C64::new(lambda_re, lambda_im),
        },
    })
}

#[pyfunction]
#[allow(clippy::too_many_arguments)]
fn power_law_coupling(species: &str, op_a: &str, op_b: &str, j_re: f64, j_im: f64, alpha: f64, k: usize, n: usize) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::PowerLawCoupling {
            species: parse_species(species)?,
            op_a: parse_operator(op_a)?,
            op_b: parse_operator(op_b)?,
            j: C64::new(j_re, j_im),
            alpha,
            k,
            n,
        },
    })
}

#[pyfunction]
fn boson_only_channel(op: &str, w_re: f64, w_im: f64) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::BosonOnly {
            op: parse_operator(op)?,
            w: C64::new(w_re, w_im),
        },
    })
}

#[pyfunction]
fn spin_boson_interaction(spin_sub_channels: Vec<PyChannel>, boson_op: &str, w_b_re: f64, w_b_im: f64) -> PyResult<PyChannel> {
    Ok(PyChannel {
        inner: Channel::SpinBosonInteraction {
            spin_sub_channels: spin_sub_channels.into_iter().map(|c| c.inner).collect(),
            boson_op: parse_operator(boson_op)?,
            w_b: C64::new(w_b_re, w_b_im),
        },
    })
}

/// A finite matrix product operator (§A.4.4).
#[pyclass(name = "Mpo", frozen)]
pub struct PyMpo {
    pub(crate) inner: Mpo,
}

#[pymethods]
impl PyMpo {
    fn max_bond_dim(&self) -> usize {
        self.inner.max_bond_dim()
    }
}

/// Compile a channel list into an MPO over `chain` (§A.4.3, §A.4.4).
#[pyfunction]
fn compile_mpo(chain: &PySiteChain, channels: Vec<PyChannel>) -> PyResult<PyMpo> {
    let chans: Vec<Channel> = channels.into_iter().map(|c| c.inner).collect();
    for c in &chans {
        c.validate().map_err(to_py_err)?;
    }
    let fsm = build_fsm(&chans).map_err(to_py_err)?;
    let mpo = build_mpo(&fsm, &chain.chain, &chain.ctx).map_err(to_py_err)?;
    Ok(PyMpo { inner: mpo })
}

/// A matrix product state (§A.3, §A.4.5), mutated in place by
/// [`run_dmrg_py`]/[`run_tdvp_py`].
#[pyclass(name = "Mps")]
pub struct PyMps {
    pub(crate) inner: Mps,
}

#[pymethods]
impl PyMps {
    fn max_bond_dim(&self) -> usize {
        self.inner.stats().max_bond_dim
    }

    fn total_elements(&self) -> usize {
        self.inner.stats().total_elements
    }
}

/// Build a product-state MPS from `pattern = [(axis, eigenindex), ...]`
/// (§A.4.5).
#[pyfunction]
fn product_state(chain: &PySiteChain, pattern: Vec<(String, usize)>) -> PyResult<PyMps> {
    let patterns: Vec<SitePattern> = pattern
        .into_iter()
        .map(|(axis, index)| -> PyResult<SitePattern> {
            Ok(SitePattern {
                axis: parse_operator(&axis)?,
                index,
            })
        })
        .collect::<PyResult<Vec<_>>>()?;
    let mps = Mps::product_state(&chain.chain, &chain.ctx, &patterns).map_err(to_py_err)?;
    Ok(PyMps { inner: mps })
}

/// Build a random MPS of uniform bond `chi0` (§A.4.5). `complex` selects the
/// scalar kind; `seed` makes the draw reproducible across calls.
#[pyfunction]
fn random_mps(chain: &PySiteChain, chi0: usize, complex: bool, seed: u64) -> PyMps {
    let kind = if complex { ScalarKind::Complex } else { ScalarKind::Real };
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mps = Mps::random(&chain.chain, &chain.ctx, chi0, kind, &mut rng);
    PyMps { inner: mps }
}

struct EnergyCollector {
    energies: Vec<f64>,
}

impl RunCallback for EnergyCollector {
    fn on_sweep_pair(&mut self, report: &SweepReport) {
        if let Some(e) = report.reported_energy {
            self.energies.push(e);
        }
    }
}

struct TimeCollector {
    times: Vec<f64>,
}

impl RunCallback for TimeCollector {
    fn on_sweep_pair(&mut self, report: &SweepReport) {
        self.times.push(report.current_time);
    }
}

/// Run two-site DMRG (§A.4.9); returns the per-sweep-pair reported energy
/// trace (§A.6).
#[pyfunction]
#[pyo3(signature = (mps, mpo, chi_max, cutoff, krylov_dim, max_iter, n_sweeps))]
#[allow(clippy::too_many_arguments)]
fn run_dmrg_py<'py>(
    py: Python<'py>,
    mps: &mut PyMps,
    mpo: &PyMpo,
    chi_max: usize,
    cutoff: f64,
    krylov_dim: usize,
    max_iter: usize,
    n_sweeps: usize,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let options = DmrgOptions {
        chi_max,
        cutoff,
        krylov_dim,
        max_iter,
        n_sweeps,
    };
    let stop = StopFlag::new();
    let mut collector = EnergyCollector { energies: Vec::new() };
    run_dmrg(&mut mps.inner, &mpo.inner, &options, &stop, &mut collector);
    Ok(collector.energies.to_pyarray(py))
}

/// Run two-site TDVP (§A.4.9); returns the per-sweep-pair elapsed
/// (physical or inverse-temperature) time trace.
#[pyfunction]
#[pyo3(signature = (mps, mpo, dt, chi_max, cutoff, krylov_dim, tol, imaginary, n_sweeps))]
#[allow(clippy::too_many_arguments)]
fn run_tdvp_py<'py>(
    py: Python<'py>,
    mps: &mut PyMps,
    mpo: &PyMpo,
    dt: f64,
    chi_max: usize,
    cutoff: f64,
    krylov_dim: usize,
    tol: f64,
    imaginary: bool,
    n_sweeps: usize,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let options = TdvpOptions {
        dt,
        chi_max,
        cutoff,
        krylov_dim,
        tol,
        evol_kind: if imaginary { EvolutionKind::Imaginary } else { EvolutionKind::Real },
        n_sweeps,
    };
    let stop = StopFlag::new();
    let mut collector = TimeCollector { times: Vec::new() };
    run_tdvp(&mut mps.inner, &mpo.inner, &options, &stop, &mut collector);
    Ok(collector.times.to_pyarray(py))
}

#[pyfunction]
fn expectation_value_py(mps: &PyMps, chain: &PySiteChain, op: &str, site: usize) -> PyResult<f64> {
    let kind = chain.chain.kind(site);
    let table = site_table(&chain.ctx, kind);
    let operator = table.operator(parse_operator(op)?).map_err(to_py_err)?;
    observables::expectation_value(&mps.inner, operator, site).map_err(to_py_err)
}

#[pyfunction]
fn subsystem_sum_py(mps: &PyMps, chain: &PySiteChain, op: &str, l: usize, m: usize) -> PyResult<f64> {
    let kind = chain.chain.kind(l);
    let table = site_table(&chain.ctx, kind);
    let operator = table.operator(parse_operator(op)?).map_err(to_py_err)?;
    observables::subsystem_sum(&mps.inner, operator, l, m).map_err(to_py_err)
}

#[pyfunction]
fn two_site_correlator_py(mps: &PyMps, chain: &PySiteChain, op_a: &str, op_b: &str, i: usize, j: usize) -> PyResult<f64> {
    let table_a = site_table(&chain.ctx, chain.chain.kind(i));
    let table_b = site_table(&chain.ctx, chain.chain.kind(j));
    let a = table_a.operator(parse_operator(op_a)?).map_err(to_py_err)?;
    let b = table_b.operator(parse_operator(op_b)?).map_err(to_py_err)?;
    observables::two_site_correlator(&mps.inner, a, b, i, j).map_err(to_py_err)
}

#[pyfunction]
fn schmidt_spectrum_py<'py>(py: Python<'py>, mps: &PyMps, bond: usize) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let spectrum = observables::schmidt_spectrum(&mps.inner, bond).map_err(to_py_err)?;
    Ok(spectrum.to_pyarray(py))
}

#[pyfunction]
fn renyi_entropy_py(mps: &PyMps, bond: usize, alpha: f64) -> PyResult<f64> {
    let spectrum = observables::schmidt_spectrum(&mps.inner, bond).map_err(to_py_err)?;
    Ok(observables::renyi_entropy(&spectrum, alpha))
}

/// The `tn_core` Python module.
#[pymodule]
fn tn_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySiteChain>()?;
    m.add_class::<PyChannel>()?;
    m.add_class::<PyMpo>()?;
    m.add_class::<PyMps>()?;
    m.add_function(wrap_pyfunction!(field_channel, m)?)?;
    m.add_function(wrap_pyfunction!(finite_range_coupling, m)?)?;
    m.add_function(wrap_pyfunction!(exp_channel_coupling, m)?)?;
    m.add_function(wrap_pyfunction!(power_law_coupling, m)?)?;
    m.add_function(wrap_pyfunction!(boson_only_channel, m)?)?;
    m.add_function(wrap_pyfunction!(spin_boson_interaction, m)?)?;
    m.add_function(wrap_pyfunction!(compile_mpo, m)?)?;
    m.add_function(wrap_pyfunction!(product_state, m)?)?;
    m.add_function(wrap_pyfunction!(random_mps, m)?)?;
    m.add_function(wrap_pyfunction!(run_dmrg_py, m)?)?;
    m.add_function(wrap_pyfunction!(run_tdvp_py, m)?)?;
    m.add_function(wrap_pyfunction!(expectation_value_py, m)?)?;
    m.add_function(wrap_pyfunction!(subsystem_sum_py, m)?)?;
    m.add_function(wrap_pyfunction!(two_site_correlator_py, m)?)?;
    m.add_function(wrap_pyfunction!(schmidt_spectrum_py, m)?)?;
    m.add_function(wrap_pyfunction!(renyi_entropy_py, m)?)?;
    Ok(())
}
