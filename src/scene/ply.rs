use crate::foundation::error::{SplatgenError, SplatgenResult};

/// Body encoding declared by the `format` header line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Clone, Debug)]
pub(crate) struct Property {
    pub(crate) name: String,
    pub(crate) kind: PropertyKind,
}

#[derive(Clone, Debug)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) count: usize,
    pub(crate) properties: Vec<Property>,
}

#[derive(Clone, Debug)]
pub(crate) struct PlyHeader {
    pub(crate) format: PlyFormat,
    pub(crate) elements: Vec<Element>,
    /// Byte offset of the first body byte (just past `end_header\n`).
    pub(crate) body_offset: usize,
}

impl PlyHeader {
    pub(crate) fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }
}

pub(crate) fn parse_header(raw: &[u8]) -> SplatgenResult<PlyHeader> {
    let mut offset = 0usize;
    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();
    let mut first = true;

    loop {
        let rest = &raw[offset..];
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            return Err(SplatgenError::malformed("PLY header is not terminated by end_header"));
        };
        let line = std::str::from_utf8(&rest[..nl])
            .map_err(|_| SplatgenError::malformed("PLY header contains non-UTF-8 bytes"))?
            .trim_end_matches('\r')
            .trim();
        offset += nl + 1;

        if first {
            if line != "ply" {
                return Err(SplatgenError::malformed("missing 'ply' magic line"));
            }
            first = false;
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            None | Some("comment") | Some("obj_info") => {}
            Some("format") => {
                format = Some(match tokens.next() {
                    Some("ascii") => PlyFormat::Ascii,
                    Some("binary_little_endian") => PlyFormat::BinaryLittleEndian,
                    Some("binary_big_endian") => PlyFormat::BinaryBigEndian,
                    other => {
                        return Err(SplatgenError::malformed(format!(
                            "unknown PLY format {other:?}"
                        )));
                    }
                });
            }
            Some("element") => {
                let name = tokens
                    .next()
                    .ok_or_else(|| SplatgenError::malformed("element line without a name"))?;
                let count = tokens
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| {
                        SplatgenError::malformed(format!("element '{name}' has no valid count"))
                    })?;
                elements.push(Element {
                    name: name.to_owned(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| SplatgenError::malformed("property declared before element"))?;
                element.properties.push(parse_property(tokens.collect())?);
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(SplatgenError::malformed(format!(
                    "unexpected PLY header keyword '{other}'"
                )));
            }
        }
    }

    let format = format.ok_or_else(|| SplatgenError::malformed("PLY header has no format line"))?;
    Ok(PlyHeader {
        format,
        elements,
        body_offset: offset,
    })
}

fn parse_property(tokens: Vec<&str>) -> SplatgenResult<Property> {
    let scalar = |name: &str| {
        ScalarType::parse(name)
            .ok_or_else(|| SplatgenError::malformed(format!("unknown PLY scalar type '{name}'")))
    };
    match tokens.as_slice() {
        ["list", count, item, name] => Ok(Property {
            name: (*name).to_owned(),
            kind: PropertyKind::List {
                count: scalar(count)?,
                item: scalar(item)?,
            },
        }),
        [ty, name] => Ok(Property {
            name: (*name).to_owned(),
            kind: PropertyKind::Scalar(scalar(ty)?),
        }),
        _ => Err(SplatgenError::malformed(format!(
            "invalid property declaration '{}'",
            tokens.join(" ")
        ))),
    }
}

/// Read the requested scalar properties of element `target` as f32 columns.
///
/// Columns come back in the order of `names`. Any missing name fails with `MalformedScene`
/// listing every absent field. Elements after `target` are never read.
pub(crate) fn read_columns(
    raw: &[u8],
    header: &PlyHeader,
    target: &str,
    names: &[&str],
) -> SplatgenResult<Vec<Vec<f32>>> {
    let element = header
        .element(target)
        .ok_or_else(|| SplatgenError::malformed(format!("PLY has no '{target}' element")))?;

    let mut slots: Vec<Option<usize>> = vec![None; element.properties.len()];
    let mut missing = Vec::new();
    for (col, name) in names.iter().enumerate() {
        match element.properties.iter().position(|p| p.name == *name) {
            Some(idx) if matches!(element.properties[idx].kind, PropertyKind::Scalar(_)) => {
                slots[idx] = Some(col);
            }
            Some(_) => {
                return Err(SplatgenError::malformed(format!(
                    "field '{name}' is a list property, expected a scalar"
                )));
            }
            None => missing.push(*name),
        }
    }
    if !missing.is_empty() {
        return Err(SplatgenError::malformed(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let body = &raw[header.body_offset..];
    let mut columns = vec![Vec::with_capacity(element.count.min(body.len())); names.len()];
    match header.format {
        PlyFormat::Ascii => read_ascii(body, header, target, &slots, &mut columns)?,
        PlyFormat::BinaryLittleEndian => {
            read_binary(body, header, target, &slots, &mut columns, false)?
        }
        PlyFormat::BinaryBigEndian => {
            read_binary(body, header, target, &slots, &mut columns, true)?
        }
    }
    Ok(columns)
}

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize) -> SplatgenResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| SplatgenError::malformed("PLY body is truncated"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn scalar(&mut self, ty: ScalarType, big_endian: bool) -> SplatgenResult<f64> {
        let b = self.take(ty.size())?;
        Ok(decode_scalar(b, ty, big_endian))
    }
}

fn decode_scalar(b: &[u8], ty: ScalarType, big_endian: bool) -> f64 {
    macro_rules! read {
        ($t:ty, $n:expr) => {{
            let mut arr = [0u8; $n];
            arr.copy_from_slice(b);
            if big_endian {
                <$t>::from_be_bytes(arr)
            } else {
                <$t>::from_le_bytes(arr)
            }
        }};
    }
    match ty {
        ScalarType::I8 => f64::from(b[0] as i8),
        ScalarType::U8 => f64::from(b[0]),
        ScalarType::I16 => f64::from(read!(i16, 2)),
        ScalarType::U16 => f64::from(read!(u16, 2)),
        ScalarType::I32 => f64::from(read!(i32, 4)),
        ScalarType::U32 => f64::from(read!(u32, 4)),
        ScalarType::F32 => f64::from(read!(f32, 4)),
        ScalarType::F64 => read!(f64, 8),
    }
}

fn list_len(v: f64) -> SplatgenResult<usize> {
    if v < 0.0 || v.fract() != 0.0 {
        return Err(SplatgenError::malformed(format!("invalid list length {v}")));
    }
    Ok(v as usize)
}

fn read_binary(
    body: &[u8],
    header: &PlyHeader,
    target: &str,
    slots: &[Option<usize>],
    columns: &mut [Vec<f32>],
    big_endian: bool,
) -> SplatgenResult<()> {
    let mut cur = ByteCursor { data: body, pos: 0 };
    for element in &header.elements {
        let is_target = element.name == target;
        if element.properties.is_empty() {
            // rows without properties occupy no bytes
            continue;
        }
        for _ in 0..element.count {
            for (idx, prop) in element.properties.iter().enumerate() {
                match prop.kind {
                    PropertyKind::Scalar(ty) => match slots.get(idx).copied().flatten() {
                        Some(col) if is_target => {
                            let v = cur.scalar(ty, big_endian)?;
                            columns[col].push(v as f32);
                        }
                        _ => {
                            cur.take(ty.size())?;
                        }
                    },
                    PropertyKind::List { count, item } => {
                        let n = list_len(cur.scalar(count, big_endian)?)?;
                        let bytes = n.checked_mul(item.size()).ok_or_else(|| {
                            SplatgenError::malformed("PLY list length overflows")
                        })?;
                        cur.take(bytes)?;
                    }
                }
            }
        }
        if is_target {
            return Ok(());
        }
    }
    Ok(())
}

fn read_ascii(
    body: &[u8],
    header: &PlyHeader,
    target: &str,
    slots: &[Option<usize>],
    columns: &mut [Vec<f32>],
) -> SplatgenResult<()> {
    let text = std::str::from_utf8(body)
        .map_err(|_| SplatgenError::malformed("ASCII PLY body contains non-UTF-8 bytes"))?;
    let mut tokens = text.split_ascii_whitespace();
    let mut next_number = |what: &str| -> SplatgenResult<f64> {
        let tok = tokens
            .next()
            .ok_or_else(|| SplatgenError::malformed("PLY body is truncated"))?;
        tok.parse::<f64>()
            .map_err(|_| SplatgenError::malformed(format!("invalid {what} value '{tok}'")))
    };

    for element in &header.elements {
        let is_target = element.name == target;
        if element.properties.is_empty() {
            // rows without properties occupy no bytes
            continue;
        }
        for _ in 0..element.count {
            for (idx, prop) in element.properties.iter().enumerate() {
                match prop.kind {
                    PropertyKind::Scalar(_) => {
                        let v = next_number(&prop.name)?;
                        if is_target && let Some(col) = slots.get(idx).copied().flatten() {
                            columns[col].push(v as f32);
                        }
                    }
                    PropertyKind::List { .. } => {
                        let n = list_len(next_number(&prop.name)?)?;
                        for _ in 0..n {
                            next_number(&prop.name)?;
                        }
                    }
                }
            }
        }
        if is_target {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/scene/ply.rs"]
mod tests;
