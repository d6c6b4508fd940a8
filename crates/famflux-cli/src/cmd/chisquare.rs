//! Likelihood-ratio test between two fitted models.

use statrs::distribution::{ChiSquared, ContinuousCDF};

use famflux_core::error::{FamFluxError, FfResult};

/// `values` is `a,b,df`: the two log-likelihoods and the degrees of
/// freedom. Prints the p-value of 2(b−a) against χ²(df).
pub fn run(values: &str) -> FfResult<()> {
    let parts: Vec<f64> = values
        .split(',')
        .map(|t| {
            t.trim()
                .parse()
                .map_err(|_| FamFluxError::Input(format!("bad LRT value '{}'", t)))
        })
        .collect::<FfResult<_>>()?;
    if parts.len() != 3 {
        return Err(FamFluxError::Input(
            "-r expects exactly three values: lnL_null,lnL_alt,df".into(),
        ));
    }

    let df = parts[2];
    let dist = ChiSquared::new(df)
        .map_err(|_| FamFluxError::Input(format!("bad degrees of freedom {}", df)))?;
    let statistic = 2.0 * (parts[1] - parts[0]);
    let pvalue = 1.0 - dist.cdf(statistic.max(0.0));
    println!("PValue = {}", pvalue);
    Ok(())
}
