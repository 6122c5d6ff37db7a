use std::time::Instant;
use rand::{ SeedableRng, rngs::StdRng };
use tensor_chain::{ Chain, GenOpts, PartialTraceOpts, linalg };
use tracing_subscriber::EnvFilter;

fn timeit<F, T>(mut f: F) -> (T, f64)
where F: FnMut() -> T
{
    let t0 = Instant::now();
    let out: T = f();
    (out, (Instant::now() - t0).as_secs_f64())
}

// PPT check on a random pure state of 8 qubits
//
//  0   1   2   3   4   5   6   7
//  o---o---o---o---o---o---o---o
//          |<-- A -->|<-- B -->|
//
// trace out sites 0 and 1, then transpose the physical indices of A; a
// negative eigenvalue of the result witnesses entanglement between A and B
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = StdRng::seed_from_u64(10546);
    let psi = Chain::rand_state(8, 10, &GenOpts::default(), &mut rng)?;
    println!("bond dimensions: {:?}", psi.bond_dims());

    print!("partial trace ... ");
    let keep: Vec<usize> = (2..8).collect();
    let opts = PartialTraceOpts { lower_ind_id: "u{}".to_string(), ..Default::default() };
    let (res, t) = timeit(|| psi.partial_trace(&keep, &opts));
    println!("{:.3e} secs", t);
    let rho_ab = res?;
    println!("Tr(rho_ab) = {:.6}", rho_ab.trace()?);

    print!("partial transpose ... ");
    let (res, t) = timeit(|| rho_ab.partial_transposed(&[0, 1, 2]));
    println!("{:.3e} secs", t);
    let rho_pt = res?;

    let (evals, _) = linalg::eigh(&rho_ab.to_dense_matrix()?)?;
    println!("min eigenvalue of rho_ab:   {:+.3e}", evals[0]);
    let (evals, _) = linalg::eigh(&rho_pt.to_dense_matrix()?)?;
    println!("min eigenvalue of rho_ab^T: {:+.3e}", evals[0]);
    let negativity: f64 =
        evals.iter().filter(|e| **e < 0.0).map(|e| e.abs()).sum();
    println!("negativity = {:.6}", negativity);

    Ok(())
}
