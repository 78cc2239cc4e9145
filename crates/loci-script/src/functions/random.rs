use super::FunctionRegistry;
use crate::interpreter::Interpreter;
use crate::random_provider;
use crate::signature::{Signature, TypeMask};
use crate::value::Value;
use loci_error::{LociResult, ensure};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        Signature::new("setSeed", TypeMask::NULL).singleton_arg("seed", TypeMask::INT),
        set_seed,
    );
    registry.register(Signature::new("getSeed", TypeMask::INT), get_seed);
    registry.register(
        Signature::new("runif", TypeMask::FLOAT)
            .singleton_arg("n", TypeMask::INT)
            .opt_singleton_arg("min", TypeMask::NUMERIC)
            .opt_singleton_arg("max", TypeMask::NUMERIC),
        runif,
    );
    registry.register(
        Signature::new("rnorm", TypeMask::FLOAT)
            .singleton_arg("n", TypeMask::INT)
            .opt_singleton_arg("mean", TypeMask::NUMERIC)
            .opt_singleton_arg("sd", TypeMask::NUMERIC),
        rnorm,
    );
    registry.register(
        Signature::new("rpois", TypeMask::INT)
            .singleton_arg("n", TypeMask::INT)
            .singleton_arg("lambda", TypeMask::NUMERIC),
        rpois,
    );
    registry.register(
        Signature::new("rbinom", TypeMask::INT)
            .singleton_arg("n", TypeMask::INT)
            .singleton_arg("size", TypeMask::INT)
            .singleton_arg("prob", TypeMask::NUMERIC),
        rbinom,
    );
    registry.register(
        Signature::new("rexp", TypeMask::FLOAT)
            .singleton_arg("n", TypeMask::INT)
            .opt_singleton_arg("mean", TypeMask::NUMERIC),
        rexp,
    );
    registry.register(
        Signature::new("rgamma", TypeMask::FLOAT)
            .singleton_arg("n", TypeMask::INT)
            .singleton_arg("mean", TypeMask::NUMERIC)
            .singleton_arg("shape", TypeMask::NUMERIC),
        rgamma,
    );
    registry.register(
        Signature::new("sample", TypeMask::ANY)
            .arg("x", TypeMask::BASE | TypeMask::OBJECT)
            .singleton_arg("size", TypeMask::INT)
            .opt_singleton_arg("replace", TypeMask::LOGICAL),
        sample,
    );
}

fn set_seed(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    random_provider::set_seed(args[0].int_at(0)?);
    Ok(Value::null().into_invisible())
}

fn get_seed(_interp: &mut Interpreter<'_>, _args: &[Value]) -> LociResult<Value> {
    Ok(Value::int(random_provider::get_seed()))
}

fn draw_count(args: &[Value]) -> LociResult<usize> {
    let n = args[0].int_at(0)?;
    ensure!(n >= 0, Domain: "a draw count must be non-negative, not {}", n);
    Ok(n as usize)
}

fn runif(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let min = args.get(1).map(|v| v.float_at(0)).transpose()?.unwrap_or(0.0);
    let max = args.get(2).map(|v| v.float_at(0)).transpose()?.unwrap_or(1.0);
    ensure!(min <= max, Domain: "runif() requires min <= max ({} vs {})", min, max);

    let out = (0..n)
        .map(|_| {
            let u: f64 = random_provider::random();
            min + u * (max - min)
        })
        .collect();
    Ok(Value::float_vec(out))
}

fn rnorm(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let mean = args.get(1).map(|v| v.float_at(0)).transpose()?.unwrap_or(0.0);
    let sd = args.get(2).map(|v| v.float_at(0)).transpose()?.unwrap_or(1.0);
    ensure!(sd >= 0.0, Domain: "rnorm() requires sd >= 0, not {}", sd);

    let out = (0..n).map(|_| random_provider::gaussian(mean, sd)).collect();
    Ok(Value::float_vec(out))
}

fn rpois(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let lambda = args[1].float_at(0)?;
    ensure!(lambda > 0.0, Domain: "rpois() requires lambda > 0, not {}", lambda);

    let out = (0..n)
        .map(|_| random_provider::poisson(lambda) as i64)
        .collect();
    Ok(Value::int_vec(out))
}

fn rbinom(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let size = args[1].int_at(0)?;
    let prob = args[2].float_at(0)?;
    ensure!(size >= 0, Domain: "rbinom() requires size >= 0, not {}", size);
    ensure!(
        (0.0..=1.0).contains(&prob),
        Domain: "rbinom() requires a probability in [0, 1], not {}", prob
    );

    let out = (0..n)
        .map(|_| random_provider::binomial(size as u64, prob) as i64)
        .collect();
    Ok(Value::int_vec(out))
}

fn rexp(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let mean = args.get(1).map(|v| v.float_at(0)).transpose()?.unwrap_or(1.0);
    ensure!(mean > 0.0, Domain: "rexp() requires mean > 0, not {}", mean);

    let out = (0..n).map(|_| random_provider::exponential(mean)).collect();
    Ok(Value::float_vec(out))
}

fn rgamma(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let n = draw_count(args)?;
    let mean = args[1].float_at(0)?;
    let shape = args[2].float_at(0)?;
    ensure!(shape > 0.0, Domain: "rgamma() requires shape > 0, not {}", shape);

    let out = (0..n)
        .map(|_| random_provider::gamma(mean, shape))
        .collect();
    Ok(Value::float_vec(out))
}

/// `sample(x, size, replace=F)`. Sampling without replacement shuffles an
/// index vector and truncates, so a full-size draw is a permutation.
fn sample(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    let size = args[1].int_at(0)?;
    let replace = match args.get(2) {
        Some(v) => v.logical_at(0)?,
        None => false,
    };

    ensure!(size >= 0, Domain: "sample() requires size >= 0, not {}", size);
    if !replace {
        ensure!(
            size as usize <= x.count(),
            Domain: "sample() cannot draw {} elements from {} without replacement",
            size,
            x.count()
        );
    }
    if size > 0 {
        ensure!(x.count() > 0, Domain: "sample() cannot draw from an empty vector");
    }

    let indices: Vec<i64> = if replace {
        (0..size)
            .map(|_| random_provider::range(0..x.count()) as i64)
            .collect()
    } else {
        random_provider::sample_indices(0..x.count(), size as usize)
            .into_iter()
            .map(|i| i as i64)
            .collect()
    };

    x.subscript(&Value::int_vec(indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::interpreter::{Interpreter, NoHost};
    use crate::symbols::Symbols;

    fn eval(source: &str) -> LociResult<Value> {
        let mut symbols = Symbols::new();
        let functions = FunctionRegistry::base();
        let mut host = NoHost;
        Interpreter::new(&mut symbols, &functions, &mut host).run(source)
    }

    #[test]
    fn test_seeding_law() {
        let a = eval("setSeed(17); runif(10);").unwrap();
        let b = eval("setSeed(17); runif(10);").unwrap();
        assert_eq!(a.float_values().unwrap(), b.float_values().unwrap());
    }

    #[test]
    fn test_sample_permutation_law() {
        let a = eval("setSeed(1); sample(1:5, 5, F);").unwrap();
        let b = eval("setSeed(1); sample(1:5, 5, F);").unwrap();
        assert_eq!(a.int_values().unwrap(), b.int_values().unwrap());

        let mut sorted = a.int_values().unwrap();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_domain_errors() {
        assert!(eval("runif(1, 5, 2);").is_err());
        assert!(eval("rbinom(1, 10, 1.5);").is_err());
        assert!(eval("sample(1:5, 6, F);").is_err());
        assert!(eval("rpois(1, 0);").is_err());
    }

    #[test]
    fn test_draw_shapes() {
        assert_eq!(eval("runif(4);").unwrap().count(), 4);
        assert_eq!(eval("rbinom(3, 10, 0.5);").unwrap().count(), 3);
        assert!(eval("setSeed(2); rbinom(1, 10, 0.5);").unwrap().int_at(0).unwrap() <= 10);
    }
}
