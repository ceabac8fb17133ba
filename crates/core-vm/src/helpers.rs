//! Pure helper library backing `HelperCall` nodes.
//!
//! These never cross the worker boundary. The inclusive-end substring and
//! list-range helpers reproduce the legacy semantics exactly:
//! - negative indices count from the end;
//! - `start > end` in an extract means wrap-around: the suffix from
//!   `start` concatenated with the prefix up to `end` inclusive;
//! - `start > end` in a delete removes the outer ranges and keeps the
//!   middle.

use crate::error::VmError;
use crate::value::{self, Value};
use core_syntax::LslType;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Per-script wall clock for `script.time` / `script.resetTime`.
#[derive(Debug, Clone)]
pub struct ScriptTimes {
    base: Instant,
}

impl Default for ScriptTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptTimes {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.base.elapsed().as_secs_f64()
    }

    pub fn reset(&mut self) {
        self.base = Instant::now();
    }
}

/// Mutable context a helper may touch.
pub struct HelperCtx<'a> {
    pub detected_len: usize,
    pub times: &'a mut ScriptTimes,
    pub rng: &'a mut u64,
    pub script_name: &'a str,
    pub memory_used: usize,
}

/// Legacy script memory ceiling, used by the free/used memory probes.
pub const MEMORY_LIMIT: usize = 65536;

pub fn call(helper: &str, args: &[Value], ctx: &mut HelperCtx<'_>) -> Result<Value, VmError> {
    let arg = |i: usize| -> Result<&Value, VmError> {
        args.get(i)
            .ok_or_else(|| VmError::Runtime(format!("`{helper}` missing argument {i}")))
    };
    match helper {
        // --- detected ----------------------------------------------------
        "detected.count" => Ok(Value::Integer(ctx.detected_len as i32)),

        // --- math --------------------------------------------------------
        "math.absInt" => Ok(Value::Integer(arg(0)?.as_int()?.wrapping_abs())),
        "math.abs" => Ok(Value::Float(arg(0)?.as_float()?.abs())),
        "math.ceil" => Ok(Value::Integer(arg(0)?.as_float()?.ceil() as i32)),
        "math.floor" => Ok(Value::Integer(arg(0)?.as_float()?.floor() as i32)),
        "math.round" => Ok(Value::Integer(arg(0)?.as_float()?.round() as i32)),
        "math.sqrt" => Ok(Value::Float(arg(0)?.as_float()?.sqrt())),
        "math.pow" => Ok(Value::Float(arg(0)?.as_float()?.powf(arg(1)?.as_float()?))),
        "math.log" => Ok(Value::Float(arg(0)?.as_float()?.ln())),
        "math.log10" => Ok(Value::Float(arg(0)?.as_float()?.log10())),
        "math.sin" => Ok(Value::Float(arg(0)?.as_float()?.sin())),
        "math.cos" => Ok(Value::Float(arg(0)?.as_float()?.cos())),
        "math.tan" => Ok(Value::Float(arg(0)?.as_float()?.tan())),
        "math.asin" => Ok(Value::Float(arg(0)?.as_float()?.asin())),
        "math.acos" => Ok(Value::Float(arg(0)?.as_float()?.acos())),
        "math.atan2" => Ok(Value::Float(
            arg(0)?.as_float()?.atan2(arg(1)?.as_float()?),
        )),
        "math.frand" => {
            let mag = arg(0)?.as_float()?;
            Ok(Value::Float(next_unit(ctx.rng) * mag))
        }
        "math.modPow" => {
            let a = arg(0)?.as_int()? as i64;
            let b = arg(1)?.as_int()? as i64;
            let c = arg(2)?.as_int()? as i64;
            if c == 0 {
                return Err(VmError::math("modulo by zero"));
            }
            let mut result: i64 = 1;
            let mut base = a.rem_euclid(c);
            let mut exp = b.max(0);
            while exp > 0 {
                if exp & 1 == 1 {
                    result = (result * base).rem_euclid(c);
                }
                base = (base * base).rem_euclid(c);
                exp >>= 1;
            }
            Ok(Value::Integer(result as i32))
        }

        // --- vectors -----------------------------------------------------
        "vec.mag" => Ok(Value::Float(arg(0)?.as_vector()?.norm())),
        "vec.norm" => {
            let v = arg(0)?.as_vector()?;
            let n = v.norm();
            Ok(Value::Vector(if n == 0.0 { v } else { v / n }))
        }
        "vec.dist" => Ok(Value::Float(
            (arg(0)?.as_vector()? - arg(1)?.as_vector()?).norm(),
        )),

        // --- rotations ---------------------------------------------------
        "rot.toEuler" => {
            let (roll, pitch, yaw) = unitize(arg(0)?.as_rotation()?).euler_angles();
            Ok(Value::Vector(Vector3::new(roll, pitch, yaw)))
        }
        "rot.fromEuler" => {
            let v = arg(0)?.as_vector()?;
            Ok(Value::Rotation(
                *UnitQuaternion::from_euler_angles(v.x, v.y, v.z).quaternion(),
            ))
        }
        "rot.fwd" => Ok(Value::Vector(value::rotate_vector(
            &Vector3::new(1.0, 0.0, 0.0),
            &arg(0)?.as_rotation()?,
        ))),
        "rot.left" => Ok(Value::Vector(value::rotate_vector(
            &Vector3::new(0.0, 1.0, 0.0),
            &arg(0)?.as_rotation()?,
        ))),
        "rot.up" => Ok(Value::Vector(value::rotate_vector(
            &Vector3::new(0.0, 0.0, 1.0),
            &arg(0)?.as_rotation()?,
        ))),
        "rot.fromAxisAngle" => {
            let axis = arg(0)?.as_vector()?;
            let angle = arg(1)?.as_float()?;
            let n = axis.norm();
            if n == 0.0 {
                return Ok(Value::Rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0)));
            }
            let unit = nalgebra::Unit::new_normalize(axis);
            Ok(Value::Rotation(
                *UnitQuaternion::from_axis_angle(&unit, angle).quaternion(),
            ))
        }
        "rot.axis" => {
            let q = unitize(arg(0)?.as_rotation()?);
            Ok(Value::Vector(
                q.axis().map(|a| a.into_inner()).unwrap_or_else(Vector3::zeros),
            ))
        }
        "rot.angle" => Ok(Value::Float(unitize(arg(0)?.as_rotation()?).angle())),
        "rot.angleBetween" => {
            let a = unitize(arg(0)?.as_rotation()?);
            let b = unitize(arg(1)?.as_rotation()?);
            Ok(Value::Float(a.angle_to(&b)))
        }
        "rot.between" => {
            let a = arg(0)?.as_vector()?;
            let b = arg(1)?.as_vector()?;
            let q = UnitQuaternion::rotation_between(&a, &b)
                .unwrap_or_else(UnitQuaternion::identity);
            Ok(Value::Rotation(*q.quaternion()))
        }

        // --- strings -----------------------------------------------------
        "string.length" => Ok(Value::Integer(arg(0)?.as_str()?.chars().count() as i32)),
        "string.toUpper" => Ok(Value::Str(arg(0)?.as_str()?.to_uppercase())),
        "string.toLower" => Ok(Value::Str(arg(0)?.as_str()?.to_lowercase())),
        "string.trim" => {
            let s = arg(0)?.as_str()?;
            let mode = arg(1).map(|v| v.as_int().unwrap_or(3)).unwrap_or(3);
            Ok(Value::Str(match mode {
                1 => s.trim_start().to_string(),
                2 => s.trim_end().to_string(),
                _ => s.trim().to_string(),
            }))
        }
        "string.indexOf" => {
            let hay: Vec<char> = arg(0)?.as_str()?.chars().collect();
            let needle: Vec<char> = arg(1)?.as_str()?.chars().collect();
            Ok(Value::Integer(find_subsequence(&hay, &needle)))
        }
        "string.insert" => {
            let dst: Vec<char> = arg(0)?.as_str()?.chars().collect();
            let index = normalize_index(arg(1)?.as_int()?, dst.len()).clamp(0, dst.len() as i64);
            let src = arg(2)?.as_str()?;
            let mut out: String = dst[..index as usize].iter().collect();
            out.push_str(src);
            out.extend(&dst[index as usize..]);
            Ok(Value::Str(out))
        }
        "string.replace" => {
            let src = arg(0)?.as_str()?;
            let pattern = arg(1)?.as_str()?;
            let replacement = arg(2)?.as_str()?;
            let count = arg(3).map(|v| v.as_int().unwrap_or(0)).unwrap_or(0);
            if pattern.is_empty() {
                return Ok(Value::Str(src.to_string()));
            }
            Ok(Value::Str(if count <= 0 {
                src.replace(pattern, replacement)
            } else {
                src.replacen(pattern, replacement, count as usize)
            }))
        }
        "string.escapeUrl" => Ok(Value::Str(escape_url(arg(0)?.as_str()?))),
        "string.unescapeUrl" => Ok(Value::Str(unescape_url(arg(0)?.as_str()?))),
        "string.toBase64" => Ok(Value::Str(base64_encode(arg(0)?.as_str()?.as_bytes()))),
        "string.fromBase64" => {
            let bytes = base64_decode(arg(0)?.as_str()?);
            Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
        }
        "string.intToBase64" => {
            let v = arg(0)?.as_int()?;
            Ok(Value::Str(base64_encode(&v.to_be_bytes())))
        }
        "string.base64ToInt" => {
            let bytes = base64_decode(arg(0)?.as_str()?);
            let mut buf = [0u8; 4];
            for (i, b) in bytes.iter().take(4).enumerate() {
                buf[i] = *b;
            }
            Ok(Value::Integer(i32::from_be_bytes(buf)))
        }

        // --- inclusive-end string / list ranges --------------------------
        "lslGetSubString" => {
            let chars: Vec<char> = arg(0)?.as_str()?.chars().collect();
            let (start, end) = (arg(1)?.as_int()?, arg(2)?.as_int()?);
            let picked = extract_inclusive(&chars, start, end);
            Ok(Value::Str(picked.into_iter().collect()))
        }
        "lslDeleteSubString" => {
            let chars: Vec<char> = arg(0)?.as_str()?.chars().collect();
            let (start, end) = (arg(1)?.as_int()?, arg(2)?.as_int()?);
            let kept = delete_inclusive(&chars, start, end);
            Ok(Value::Str(kept.into_iter().collect()))
        }
        "lslListSlice" => {
            let items = arg(0)?.as_list()?.to_vec();
            let (start, end) = (arg(1)?.as_int()?, arg(2)?.as_int()?);
            Ok(Value::List(extract_inclusive(&items, start, end)))
        }
        "lslDeleteSubList" => {
            let items = arg(0)?.as_list()?.to_vec();
            let (start, end) = (arg(1)?.as_int()?, arg(2)?.as_int()?);
            Ok(Value::List(delete_inclusive(&items, start, end)))
        }

        // --- lists -------------------------------------------------------
        "list.length" => Ok(Value::Integer(arg(0)?.as_list()?.len() as i32)),
        "list.toString" => Ok(list_entry(arg(0)?, arg(1)?)?
            .map(|v| Value::Str(v.to_lsl_string()))
            .unwrap_or(Value::Str(String::new()))),
        "list.toInteger" => Ok(list_entry(arg(0)?, arg(1)?)?
            .map(|v| v.cast(LslType::Integer).unwrap_or(Value::Integer(0)))
            .unwrap_or(Value::Integer(0))),
        "list.toFloat" => Ok(list_entry(arg(0)?, arg(1)?)?
            .map(|v| v.cast(LslType::Float).unwrap_or(Value::Float(0.0)))
            .unwrap_or(Value::Float(0.0))),
        "list.toKey" => Ok(list_entry(arg(0)?, arg(1)?)?
            .map(|v| Value::Key(v.to_lsl_string()))
            .unwrap_or(Value::Key(String::new()))),
        "list.toVector" => Ok(list_entry(arg(0)?, arg(1)?)?
            .and_then(|v| match v {
                Value::Vector(_) => Some(v),
                Value::Str(s) => value::parse_vector(&s).map(Value::Vector),
                _ => None,
            })
            .unwrap_or(Value::Vector(Vector3::zeros()))),
        "list.toRotation" => Ok(list_entry(arg(0)?, arg(1)?)?
            .and_then(|v| match v {
                Value::Rotation(_) => Some(v),
                Value::Str(s) => value::parse_rotation(&s).map(Value::Rotation),
                _ => None,
            })
            .unwrap_or(Value::Rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0)))),
        "list.entryType" => Ok(Value::Integer(
            list_entry(arg(0)?, arg(1)?)?
                .map(|v| match v.ty() {
                    LslType::Integer => 1,
                    LslType::Float => 2,
                    LslType::String => 3,
                    LslType::Key => 4,
                    LslType::Vector => 5,
                    LslType::Rotation => 6,
                    LslType::List => 0,
                })
                .unwrap_or(0),
        )),
        "list.sort" => {
            let items = arg(0)?.as_list()?.to_vec();
            let stride = arg(1)?.as_int()?.max(1) as usize;
            let ascending = arg(2)?.as_int()? != 0;
            Ok(Value::List(sort_strided(items, stride, ascending)))
        }
        "list.randomize" => {
            let items = arg(0)?.as_list()?.to_vec();
            let stride = arg(1).map(|v| v.as_int().unwrap_or(1)).unwrap_or(1).max(1) as usize;
            Ok(Value::List(shuffle_strided(items, stride, ctx.rng)))
        }
        "list.find" => {
            let hay = arg(0)?.as_list()?;
            let needle = arg(1)?.as_list()?;
            Ok(Value::Integer(find_subsequence(hay, needle)))
        }
        "list.insert" => {
            let dst = arg(0)?.as_list()?.to_vec();
            let src = arg(1)?.as_list()?.to_vec();
            let index = normalize_index(arg(2)?.as_int()?, dst.len()).clamp(0, dst.len() as i64);
            let mut out = dst[..index as usize].to_vec();
            out.extend(src);
            out.extend_from_slice(&dst[index as usize..]);
            Ok(Value::List(out))
        }
        "list.replace" => {
            let dst = arg(0)?.as_list()?.to_vec();
            let src = arg(1)?.as_list()?.to_vec();
            let (start, end) = (arg(2)?.as_int()?, arg(3)?.as_int()?);
            let mut out = delete_inclusive(&dst, start, end);
            let at = normalize_index(start, dst.len()).clamp(0, out.len() as i64) as usize;
            let _ = out.splice(at..at, src);
            Ok(Value::List(out))
        }
        "list.parseString" => parse_string_to_list(args, false),
        "list.parseStringKeepNulls" => parse_string_to_list(args, true),
        "list.dump" => {
            let items = arg(0)?.as_list()?;
            let sep = arg(1)?.to_lsl_string();
            Ok(Value::Str(
                items
                    .iter()
                    .map(|v| v.to_lsl_string())
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        "list.fromCsv" => {
            let src = arg(0)?.as_str()?;
            if src.is_empty() {
                return Ok(Value::List(vec![Value::Str(String::new())]));
            }
            Ok(Value::List(
                src.split(", ")
                    .map(|part| Value::Str(part.to_string()))
                    .collect(),
            ))
        }
        "list.toCsv" => {
            let items = arg(0)?.as_list()?;
            Ok(Value::Str(
                items
                    .iter()
                    .map(|v| v.to_lsl_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ))
        }
        "list.statistics" => {
            let op = arg(0)?.as_int()?;
            let numbers: Vec<f64> = arg(1)?
                .as_list()?
                .iter()
                .filter_map(|v| v.as_float().ok())
                .collect();
            Ok(Value::Float(list_statistics(op, &numbers)))
        }

        // --- time --------------------------------------------------------
        "time.unix" => Ok(Value::Integer(unix_now() as i32)),
        "time.timestamp" => Ok(Value::Str(iso_timestamp())),
        "time.date" => Ok(Value::Str(iso_timestamp()[..10].to_string())),
        "time.gmtClock" => {
            let secs = unix_now() % 86_400;
            Ok(Value::Float(secs as f64))
        }

        // --- script-local ------------------------------------------------
        "script.time" => Ok(Value::Float(ctx.times.elapsed())),
        "script.resetTime" => {
            ctx.times.reset();
            Ok(Value::Integer(0))
        }
        "script.getAndResetTime" => {
            let elapsed = ctx.times.elapsed();
            ctx.times.reset();
            Ok(Value::Float(elapsed))
        }
        "script.name" => Ok(Value::Str(ctx.script_name.to_string())),
        "script.freeMemory" => Ok(Value::Integer(
            MEMORY_LIMIT.saturating_sub(ctx.memory_used) as i32,
        )),
        "script.usedMemory" => Ok(Value::Integer(ctx.memory_used as i32)),

        // --- keys --------------------------------------------------------
        "key.generate" => Ok(Value::Key(generate_uuid(ctx.rng))),

        other => Err(VmError::Runtime(format!("unknown helper `{other}`"))),
    }
}

fn unitize(q: Quaternion<f64>) -> UnitQuaternion<f64> {
    let n = q.norm();
    if n == 0.0 {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_quaternion(q / n)
    }
}

// ---------------------------------------------------------------------
// Inclusive-end range semantics
// ---------------------------------------------------------------------

fn normalize_index(index: i32, len: usize) -> i64 {
    let index = index as i64;
    if index < 0 { index + len as i64 } else { index }
}

/// Extract `[start..=end]` with wrap-around when `start > end`: the
/// suffix from `start` followed by the prefix up to `end` inclusive.
fn extract_inclusive<T: Clone>(items: &[T], start: i32, end: i32) -> Vec<T> {
    let len = items.len() as i64;
    if len == 0 {
        return Vec::new();
    }
    let s = normalize_index(start, items.len());
    let e = normalize_index(end, items.len());
    if s <= e {
        let s = s.clamp(0, len) as usize;
        let e = e.clamp(-1, len - 1);
        if e < s as i64 {
            return Vec::new();
        }
        items[s..=(e as usize)].to_vec()
    } else {
        let mut out = Vec::new();
        if s < len {
            out.extend_from_slice(&items[s.clamp(0, len) as usize..]);
        }
        if e >= 0 {
            out.extend_from_slice(&items[..=(e.min(len - 1) as usize)]);
        }
        out
    }
}

/// Delete `[start..=end]`; when `start > end` the outer ranges go and the
/// middle stays.
fn delete_inclusive<T: Clone>(items: &[T], start: i32, end: i32) -> Vec<T> {
    let len = items.len() as i64;
    if len == 0 {
        return Vec::new();
    }
    let s = normalize_index(start, items.len());
    let e = normalize_index(end, items.len());
    if s <= e {
        let mut out = Vec::new();
        if s > 0 {
            out.extend_from_slice(&items[..s.min(len) as usize]);
        }
        if e < len - 1 && e >= -1 {
            out.extend_from_slice(&items[(e + 1).max(0) as usize..]);
        }
        out
    } else {
        // Outer ranges deleted; keep (end, start) exclusive.
        let keep_from = (e + 1).clamp(0, len);
        let keep_to = s.clamp(0, len);
        items[keep_from as usize..keep_to as usize].to_vec()
    }
}

fn list_entry(list: &Value, index: &Value) -> Result<Option<Value>, VmError> {
    let items = list.as_list()?;
    let idx = normalize_index(index.as_int()?, items.len());
    if idx < 0 || idx >= items.len() as i64 {
        return Ok(None);
    }
    Ok(Some(items[idx as usize].clone()))
}

fn find_subsequence<T: PartialEq>(hay: &[T], needle: &[T]) -> i32 {
    if needle.is_empty() {
        return 0;
    }
    if needle.len() > hay.len() {
        return -1;
    }
    for i in 0..=(hay.len() - needle.len()) {
        if hay[i..i + needle.len()] == *needle {
            return i as i32;
        }
    }
    -1
}

fn sort_strided(items: Vec<Value>, stride: usize, ascending: bool) -> Vec<Value> {
    if stride == 0 || !items.len().is_multiple_of(stride) {
        return items;
    }
    let mut blocks: Vec<&[Value]> = items.chunks(stride).collect();
    blocks.sort_by(|a, b| {
        let ord = compare_values(&a[0], &b[0]);
        if ascending { ord } else { ord.reverse() }
    });
    blocks.into_iter().flatten().cloned().collect()
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_float(), b.as_float()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_lsl_string().cmp(&b.to_lsl_string()),
    }
}

fn shuffle_strided(items: Vec<Value>, stride: usize, rng: &mut u64) -> Vec<Value> {
    if stride == 0 || !items.len().is_multiple_of(stride) {
        return items;
    }
    let mut blocks: Vec<Vec<Value>> = items.chunks(stride).map(<[Value]>::to_vec).collect();
    for i in (1..blocks.len()).rev() {
        let j = (next_u64(rng) % (i as u64 + 1)) as usize;
        blocks.swap(i, j);
    }
    blocks.into_iter().flatten().collect()
}

fn list_statistics(op: i32, numbers: &[f64]) -> f64 {
    if numbers.is_empty() {
        return 0.0;
    }
    let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = numbers.iter().sum();
    let mean = sum / numbers.len() as f64;
    match op {
        0 => max - min,
        1 => min,
        2 => max,
        3 => mean,
        4 => {
            let mut sorted = numbers.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len().is_multiple_of(2) {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        5 => {
            if numbers.len() < 2 {
                return 0.0;
            }
            let var = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / (numbers.len() - 1) as f64;
            var.sqrt()
        }
        6 => sum,
        7 => numbers.iter().map(|x| x * x).sum(),
        8 => numbers.len() as f64,
        9 => {
            let product: f64 = numbers.iter().map(|x| x.abs().max(f64::MIN_POSITIVE)).product();
            product.powf(1.0 / numbers.len() as f64)
        }
        _ => 0.0,
    }
}

fn parse_string_to_list(args: &[Value], keep_nulls: bool) -> Result<Value, VmError> {
    let src = args
        .first()
        .ok_or_else(|| VmError::Runtime("parse: missing source".into()))?
        .as_str()?;
    let empty = Vec::new();
    let separators: Vec<String> = args
        .get(1)
        .map(|v| v.as_list())
        .transpose()?
        .unwrap_or(&empty)
        .iter()
        .map(|v| v.to_lsl_string())
        .filter(|s| !s.is_empty())
        .collect();
    let spacers: Vec<String> = args
        .get(2)
        .map(|v| v.as_list())
        .transpose()?
        .unwrap_or(&empty)
        .iter()
        .map(|v| v.to_lsl_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut out: Vec<Value> = Vec::new();
    let mut rest = src;
    loop {
        // Earliest match among separators and spacers; separators win ties.
        let mut best: Option<(usize, &str, bool)> = None;
        for sep in &separators {
            if let Some(pos) = rest.find(sep.as_str()) {
                let better = best.is_none_or(|(bpos, btok, _)| {
                    pos < bpos || (pos == bpos && sep.len() > btok.len())
                });
                if better {
                    best = Some((pos, sep, false));
                }
            }
        }
        for spacer in &spacers {
            if let Some(pos) = rest.find(spacer.as_str()) {
                let better = best.is_none_or(|(bpos, btok, is_spacer)| {
                    pos < bpos || (pos == bpos && is_spacer && spacer.len() > btok.len())
                });
                if better {
                    best = Some((pos, spacer, true));
                }
            }
        }
        match best {
            None => {
                if !rest.is_empty() || keep_nulls {
                    out.push(Value::Str(rest.to_string()));
                }
                break;
            }
            Some((pos, token, is_spacer)) => {
                let head = &rest[..pos];
                if !head.is_empty() || keep_nulls {
                    out.push(Value::Str(head.to_string()));
                }
                if is_spacer {
                    out.push(Value::Str(token.to_string()));
                }
                rest = &rest[pos + token.len()..];
            }
        }
    }
    Ok(Value::List(out))
}

// ---------------------------------------------------------------------
// URL / base64 codecs
// ---------------------------------------------------------------------

fn escape_url(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn unescape_url(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
                && let Ok(v) = u8::from_str_radix(hex, 16)
            {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
        out.push(BASE64_ALPHABET[(n >> 18) as usize & 63] as char);
        out.push(BASE64_ALPHABET[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            BASE64_ALPHABET[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_ALPHABET[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}

fn base64_decode(s: &str) -> Vec<u8> {
    let value_of = |c: u8| -> Option<u32> {
        BASE64_ALPHABET.iter().position(|&a| a == c).map(|v| v as u32)
    };
    let cleaned: Vec<u32> = s
        .bytes()
        .filter(|&c| c != b'=' && !c.is_ascii_whitespace())
        .filter_map(value_of)
        .collect();
    let mut out = Vec::with_capacity(cleaned.len() * 3 / 4);
    for chunk in cleaned.chunks(4) {
        let mut n: u32 = 0;
        for (i, v) in chunk.iter().enumerate() {
            n |= v << (18 - 6 * i as u32);
        }
        out.push((n >> 16) as u8);
        if chunk.len() > 2 {
            out.push((n >> 8) as u8);
        }
        if chunk.len() > 3 {
            out.push(n as u8);
        }
    }
    out
}

// ---------------------------------------------------------------------
// Time / randomness
// ---------------------------------------------------------------------

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Days-to-civil conversion (proleptic Gregorian).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn iso_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() as i64;
    let micros = now.subsec_micros();
    let (year, month, day) = civil_from_days(secs.div_euclid(86_400));
    let tod = secs.rem_euclid(86_400);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{micros:06}Z",
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

fn next_u64(rng: &mut u64) -> u64 {
    // xorshift64* — cheap, deterministic per seed, good enough for
    // scripted randomness.
    let mut x = *rng;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *rng = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

fn next_unit(rng: &mut u64) -> f64 {
    (next_u64(rng) >> 11) as f64 / (1u64 << 53) as f64
}

fn generate_uuid(rng: &mut u64) -> String {
    let a = next_u64(rng);
    let b = next_u64(rng);
    let bytes: Vec<u8> = a
        .to_be_bytes()
        .into_iter()
        .chain(b.to_be_bytes())
        .collect();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-4{:01x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
        bytes[6] & 0x0f,
        bytes[7],
        (bytes[8] & 0x3f) | 0x80,
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(times: &'a mut ScriptTimes, rng: &'a mut u64) -> HelperCtx<'a> {
        HelperCtx {
            detected_len: 0,
            times,
            rng,
            script_name: "test",
            memory_used: 0,
        }
    }

    fn call_helper(name: &str, args: &[Value]) -> Value {
        let mut times = ScriptTimes::new();
        let mut rng = 0x1234_5678_9abc_def0;
        call(name, args, &mut ctx(&mut times, &mut rng)).expect("helper call")
    }

    fn s(v: &str) -> Value {
        Value::Str(v.into())
    }

    #[test]
    fn substring_basic_and_negative() {
        assert_eq!(
            call_helper("lslGetSubString", &[s("hello"), Value::Integer(1), Value::Integer(3)]),
            s("ell")
        );
        assert_eq!(
            call_helper(
                "lslGetSubString",
                &[s("hello"), Value::Integer(-3), Value::Integer(-1)]
            ),
            s("llo")
        );
    }

    #[test]
    fn substring_wraps_when_start_exceeds_end() {
        // Suffix from start, then prefix through end.
        assert_eq!(
            call_helper("lslGetSubString", &[s("abcdef"), Value::Integer(4), Value::Integer(1)]),
            s("efab")
        );
    }

    #[test]
    fn delete_substring_inner_and_outer() {
        assert_eq!(
            call_helper(
                "lslDeleteSubString",
                &[s("abcdef"), Value::Integer(1), Value::Integer(3)]
            ),
            s("aef")
        );
        // start > end: outer ranges deleted, middle kept.
        assert_eq!(
            call_helper(
                "lslDeleteSubString",
                &[s("abcdef"), Value::Integer(4), Value::Integer(1)]
            ),
            s("cd")
        );
    }

    #[test]
    fn list_slice_matches_string_semantics() {
        let list = Value::List(
            (0..6).map(Value::Integer).collect(),
        );
        assert_eq!(
            call_helper("lslListSlice", &[list.clone(), Value::Integer(4), Value::Integer(1)]),
            Value::List(vec![
                Value::Integer(4),
                Value::Integer(5),
                Value::Integer(0),
                Value::Integer(1)
            ])
        );
        assert_eq!(
            call_helper("lslDeleteSubList", &[list, Value::Integer(4), Value::Integer(1)]),
            Value::List(vec![Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn parse_string_with_separators_and_spacers() {
        let out = call_helper(
            "list.parseString",
            &[
                s("a,b;c"),
                Value::List(vec![s(",")]),
                Value::List(vec![s(";")]),
            ],
        );
        assert_eq!(
            out,
            Value::List(vec![s("a"), s("b"), s(";"), s("c")])
        );
    }

    #[test]
    fn parse_string_keep_nulls_preserves_empties() {
        let out = call_helper(
            "list.parseStringKeepNulls",
            &[s("a,,b"), Value::List(vec![s(",")]), Value::List(vec![])],
        );
        assert_eq!(out, Value::List(vec![s("a"), s(""), s("b")]));
    }

    #[test]
    fn base64_round_trip() {
        let encoded = call_helper("string.toBase64", &[s("Hello")]);
        assert_eq!(encoded, s("SGVsbG8="));
        assert_eq!(call_helper("string.fromBase64", &[encoded]), s("Hello"));
    }

    #[test]
    fn int_base64_round_trip() {
        let encoded = call_helper("string.intToBase64", &[Value::Integer(1)]);
        let back = call_helper("string.base64ToInt", &[encoded]);
        assert_eq!(back, Value::Integer(1));
    }

    #[test]
    fn url_escape_round_trip() {
        let escaped = call_helper("string.escapeUrl", &[s("a b/c?")]);
        assert_eq!(escaped, s("a%20b%2Fc%3F"));
        assert_eq!(call_helper("string.unescapeUrl", &[escaped]), s("a b/c?"));
    }

    #[test]
    fn strided_sort() {
        let list = Value::List(vec![
            Value::Integer(3),
            s("c"),
            Value::Integer(1),
            s("a"),
            Value::Integer(2),
            s("b"),
        ]);
        let sorted = call_helper("list.sort", &[list, Value::Integer(2), Value::Integer(1)]);
        assert_eq!(
            sorted,
            Value::List(vec![
                Value::Integer(1),
                s("a"),
                Value::Integer(2),
                s("b"),
                Value::Integer(3),
                s("c"),
            ])
        );
    }

    #[test]
    fn csv_round_trip() {
        let out = call_helper("list.fromCsv", &[s("a, b, c")]);
        assert_eq!(out, Value::List(vec![s("a"), s("b"), s("c")]));
        assert_eq!(
            call_helper("list.toCsv", &[out]),
            s("a, b, c")
        );
    }

    #[test]
    fn generated_keys_look_like_uuids() {
        let Value::Key(k) = call_helper("key.generate", &[]) else {
            panic!("expected key");
        };
        assert_eq!(k.len(), 36);
        assert_eq!(k.chars().filter(|c| *c == '-').count(), 4);
        assert_eq!(&k[14..15], "4");
    }

    #[test]
    fn timestamp_shape() {
        let Value::Str(ts) = call_helper("time.timestamp", &[]) else {
            panic!("expected string");
        };
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn civil_conversion_known_date() {
        // 2026-08-01 is day 20666 after the epoch.
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
