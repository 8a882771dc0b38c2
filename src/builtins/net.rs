// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! IP address and CIDR values.
//!
//! ```text
//! cidr('10.0.0.0/8').containsIP(ip(self.address)) && !ip(self.address).isLoopback()
//! ```

use crate::builtins::utils::{ensure_args_count, ensure_receiver, ensure_string, no_overload};
use crate::builtins::{is_dyn_or, BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, OpaqueType, ScalarType};
use crate::value::Value;

use core::net::IpAddr;
use std::collections::HashMap;

use ipnet::IpNet;

const IP: DeclType = DeclType::Opaque(OpaqueType::Ip);
const CIDR: DeclType = DeclType::Opaque(OpaqueType::Cidr);

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    // `ip(string)` parses an address, `cidr.ip()` returns the address of a prefix.
    m.insert("ip", (Receiver::Optional, check_ip, ip));
    m.insert("cidr", (Receiver::None, check_cidr, cidr));
    m.insert("isIP", (Receiver::None, check_is_valid, is_ip));
    m.insert("isCIDR", (Receiver::None, check_is_valid, is_cidr));
    m.insert("is4", (Receiver::Required, check_ip_predicate, is4));
    m.insert("is6", (Receiver::Required, check_ip_predicate, is6));
    m.insert("isLoopback", (Receiver::Required, check_ip_predicate, is_loopback));
    m.insert("isUnspecified", (Receiver::Required, check_ip_predicate, is_unspecified));
    m.insert("family", (Receiver::Required, check_family, family));
    m.insert("containsIP", (Receiver::Required, check_contains_ip, contains_ip));
    m.insert("containsCIDR", (Receiver::Required, check_contains_cidr, contains_cidr));
    m.insert("overlaps", (Receiver::Required, check_overlaps, overlaps));
    m.insert("prefixLength", (Receiver::Required, check_prefix_length, prefix_length));
    m.insert("masked", (Receiver::Required, check_masked, masked));
}

fn is(ty: &DeclType, expected: OpaqueType) -> bool {
    ty.is_dyn_like() || *ty == DeclType::Opaque(expected)
}

fn is_string(ty: &DeclType) -> bool {
    is_dyn_or(ty, ScalarType::String)
}

fn check_ip(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let receiver = receiver?;
    (args.is_empty() && (is_string(receiver) || is(receiver, OpaqueType::Cidr))).then_some(IP)
}

fn check_cidr(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (receiver.is_none() && args.len() == 1 && is_string(&args[0])).then_some(CIDR)
}

fn check_is_valid(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (receiver.is_none() && args.len() == 1 && is_string(&args[0])).then_some(DeclType::BOOL)
}

fn check_ip_predicate(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (args.is_empty() && is(receiver?, OpaqueType::Ip)).then_some(DeclType::BOOL)
}

fn check_family(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (args.is_empty() && is(receiver?, OpaqueType::Ip)).then_some(DeclType::INT)
}

fn check_contains_ip(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is(receiver?, OpaqueType::Cidr)
        && args.len() == 1
        && (is(&args[0], OpaqueType::Ip) || is_string(&args[0]));
    ok.then_some(DeclType::BOOL)
}

fn check_contains_cidr(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is(receiver?, OpaqueType::Cidr)
        && args.len() == 1
        && (is(&args[0], OpaqueType::Cidr) || is_string(&args[0]));
    ok.then_some(DeclType::BOOL)
}

fn check_overlaps(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is(receiver?, OpaqueType::Cidr) && args.len() == 1 && is(&args[0], OpaqueType::Cidr);
    ok.then_some(DeclType::BOOL)
}

fn check_prefix_length(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (args.is_empty() && is(receiver?, OpaqueType::Cidr)).then_some(DeclType::INT)
}

fn check_masked(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (args.is_empty() && is(receiver?, OpaqueType::Cidr)).then_some(CIDR)
}

fn parse_ip(s: &str) -> Result<IpAddr, EvalError> {
    s.parse().map_err(|e| {
        EvalError::InvalidArgument(format!("IP parse error during conversion from string: {e}"))
    })
}

fn parse_cidr(s: &str) -> Result<IpNet, EvalError> {
    s.parse().map_err(|e| {
        EvalError::InvalidArgument(format!("CIDR parse error during conversion from string: {e}"))
    })
}

fn string_arg<'a>(
    fcn: &str,
    cost: &mut CostTracker,
    args: &'a [Value],
) -> Result<&'a str, EvalError> {
    ensure_args_count(fcn, args, 1)?;
    let s = ensure_string(fcn, &args[0])?;
    cost.charge_size(s.len())?;
    Ok(s)
}

fn ip_receiver(fcn: &str, r: Option<&Value>, args: &[Value]) -> Result<IpAddr, EvalError> {
    ensure_args_count(fcn, args, 0)?;
    match ensure_receiver(fcn, r)? {
        Value::Ip(ip) => Ok(*ip),
        v => Err(no_overload(fcn, v)),
    }
}

fn cidr_receiver(fcn: &str, r: Option<&Value>) -> Result<IpNet, EvalError> {
    match ensure_receiver(fcn, r)? {
        Value::Cidr(cidr) => Ok(*cidr),
        v => Err(no_overload(fcn, v)),
    }
}

fn ip(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "ip";
    ensure_args_count(name, args, 0)?;
    match ensure_receiver(name, r)? {
        Value::String(s) => {
            cost.charge_size(s.len())?;
            Ok(Value::Ip(parse_ip(s)?))
        }
        Value::Cidr(cidr) => Ok(Value::Ip(cidr.addr())),
        v => Err(no_overload(name, v)),
    }
}

fn cidr(cost: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let s = string_arg("cidr", cost, args)?;
    Ok(Value::Cidr(parse_cidr(s)?))
}

fn is_ip(cost: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let s = string_arg("isIP", cost, args)?;
    Ok(Value::Bool(s.parse::<IpAddr>().is_ok()))
}

fn is_cidr(cost: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let s = string_arg("isCIDR", cost, args)?;
    Ok(Value::Bool(s.parse::<IpNet>().is_ok()))
}

fn is4(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(ip_receiver("is4", r, args)?.is_ipv4()))
}

fn is6(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(ip_receiver("is6", r, args)?.is_ipv6()))
}

fn is_loopback(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    // IPv4 addresses mapped into IPv6 are loopback when the IPv4 address is.
    let ip = ip_receiver("isLoopback", r, args)?;
    Ok(Value::Bool(ip.to_canonical().is_loopback()))
}

fn is_unspecified(
    _: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    Ok(Value::Bool(ip_receiver("isUnspecified", r, args)?.is_unspecified()))
}

fn family(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Int(match ip_receiver("family", r, args)? {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 6,
    }))
}

fn contains_ip(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "containsIP";
    let cidr = cidr_receiver(name, r)?;
    ensure_args_count(name, args, 1)?;
    let ip = match &args[0] {
        Value::Ip(ip) => *ip,
        Value::String(s) => {
            cost.charge_size(s.len())?;
            parse_ip(s)?
        }
        v => return Err(no_overload(name, v)),
    };
    Ok(Value::Bool(cidr.contains(&ip)))
}

fn contains_cidr(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "containsCIDR";
    let cidr = cidr_receiver(name, r)?;
    ensure_args_count(name, args, 1)?;
    let other = match &args[0] {
        Value::Cidr(other) => *other,
        Value::String(s) => {
            cost.charge_size(s.len())?;
            parse_cidr(s)?
        }
        v => return Err(no_overload(name, v)),
    };
    Ok(Value::Bool(cidr.contains(&other)))
}

fn overlaps(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "overlaps";
    let cidr = cidr_receiver(name, r)?;
    ensure_args_count(name, args, 1)?;
    let Value::Cidr(other) = &args[0] else {
        return Err(no_overload(name, &args[0]));
    };
    Ok(Value::Bool(
        cidr.contains(&other.network()) || other.contains(&cidr.network()),
    ))
}

fn prefix_length(
    _: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "prefixLength";
    ensure_args_count(name, args, 0)?;
    Ok(Value::Int(i64::from(cidr_receiver(name, r)?.prefix_len())))
}

fn masked(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "masked";
    ensure_args_count(name, args, 0)?;
    Ok(Value::Cidr(cidr_receiver(name, r)?.trunc()))
}

#[cfg(test)]
mod tests {
    use crate::activation::MapActivation;
    use crate::checker::TypeEnv;
    use crate::error::{CompileError, EvalError};
    use crate::program::{CelProgram, EvalOptions, Program};
    use crate::types::DeclType;
    use crate::value::Value;

    fn eval(source: &str) -> Result<Value, EvalError> {
        let env = TypeEnv::new().with_var("addr", DeclType::STRING);
        let program = CelProgram::compile(source, &env).unwrap();
        let activation = MapActivation::new().with("addr", Value::from("192.168.1.7"));
        program.eval(&activation, &EvalOptions::default()).result
    }

    #[test]
    fn address_predicates() {
        for (source, expected) in [
            ("ip(addr).is4()", true),
            ("ip(addr).is6()", false),
            ("ip(addr).family() == 4", true),
            ("ip(addr) == ip('192.168.1.7')", true),
            ("ip('::1').isLoopback()", true),
            ("ip('::ffff:127.0.0.1').isLoopback()", true),
            ("ip('0.0.0.0').isUnspecified()", true),
            ("ip('fd00::1').family() == 6", true),
            ("isIP(addr)", true),
            ("isIP('192.168.1.300')", false),
            ("isCIDR('10.0.0.0/33')", false),
        ] {
            assert_eq!(eval(source), Ok(Value::Bool(expected)), "{source}");
        }
    }

    #[test]
    fn prefix_functions() {
        for (source, expected) in [
            ("cidr('192.168.0.0/16').containsIP(ip(addr))", true),
            ("cidr('192.168.0.0/16').containsIP('10.0.0.1')", false),
            ("cidr('10.0.0.0/8').containsCIDR('10.1.0.0/16')", true),
            ("cidr('10.1.0.0/16').containsCIDR(cidr('10.0.0.0/8'))", false),
            ("cidr('10.0.0.0/8').overlaps(cidr('10.200.0.0/16'))", true),
            ("cidr('10.0.0.0/8').overlaps(cidr('11.0.0.0/8'))", false),
            ("cidr('10.1.2.3/8').prefixLength() == 8", true),
            ("string(cidr('10.1.2.3/8').masked()) == '10.0.0.0/8'", true),
            ("string(cidr('10.1.2.3/8').ip()) == '10.1.2.3'", true),
        ] {
            assert_eq!(eval(source), Ok(Value::Bool(expected)), "{source}");
        }
    }

    #[test]
    fn malformed_addresses_fail_at_runtime() {
        assert!(matches!(
            eval("ip('not an address').is4()"),
            Err(EvalError::InvalidArgument(m)) if m.starts_with("IP parse error")
        ));
        assert!(matches!(
            eval("cidr(addr).prefixLength() > 0"),
            Err(EvalError::InvalidArgument(m)) if m.starts_with("CIDR parse error")
        ));
    }

    #[test]
    fn receivers_are_type_checked() {
        let env = TypeEnv::new();
        for source in ["'1.2.3.4'.is4()", "ip('1.2.3.4').prefixLength()", "cidr(1)"] {
            assert!(
                matches!(CelProgram::compile(source, &env), Err(CompileError::Check(_))),
                "{source}"
            );
        }
    }
}
