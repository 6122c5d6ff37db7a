use std::time::Instant;
use rand::{ SeedableRng, rngs::StdRng };
use tensor_chain::{
    Chain,
    CompressOpts,
    CutoffMode,
    Form,
    GenOpts,
    Method,
    Truncation,
};
use tracing_subscriber::EnvFilter;

fn timeit<F, T>(mut f: F) -> (T, f64)
where F: FnMut() -> T
{
    let t0 = Instant::now();
    let out: T = f();
    (out, (Instant::now() - t0).as_secs_f64())
}

// add a random state to itself and compress the result back down under each
// truncation policy
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = StdRng::seed_from_u64(10546);
    let psi = Chain::rand_state(20, 16, &GenOpts::default(), &mut rng)?;
    let sum = psi.add(&psi)?;
    println!("max bond of sum: {}", sum.max_bond());

    for method in [Method::Svd, Method::Eig] {
        for mode in [CutoffMode::Abs, CutoffMode::Rel, CutoffMode::Sum2] {
            let opts = CompressOpts {
                form: Form::Site(10),
                method,
                trunc: Truncation { mode, ..Truncation::default() },
                ..CompressOpts::default()
            };
            print!("compress {:?}/{:?} ... ", method, mode);
            let (res, t) = timeit(|| sum.compressed(&opts));
            println!("{:.3e} secs", t);
            let compressed = res?;
            println!(
                "  max bond = {}, <sum|psi> = {:.6}, form = {:?}",
                compressed.max_bond(),
                compressed.inner(&psi)?,
                compressed.form(),
            );
        }
    }

    // a hard cap loses weight
    let mut capped = sum.clone();
    capped.compress(&CompressOpts::max_bond(4))?;
    println!(
        "max_bond = 4: <capped|capped> = {:.6} (was {:.6})",
        capped.norm_squared()?,
        sum.norm_squared()?,
    );
    println!("spectrum at bond 9: {:?}", capped.singular_values(9)?);

    Ok(())
}
