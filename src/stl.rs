use std::path::Path;

use log::{info, warn};

use crate::{
    datatypes::{Triangle, Vertex},
    error::{EdgePredictError, Result},
};

/// Marker that opens a text-encoded STL file
const ASCII_MARKER: &[u8; 5] = b"solid";
const BINARY_HEADER_LEN: usize = 80;
const BINARY_PREAMBLE_LEN: usize = BINARY_HEADER_LEN + 4;
/// normal + three vertices + attribute byte count
const BINARY_TRIANGLE_LEN: usize = 4 * 3 * 4 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlFormat {
    Ascii,
    Binary,
}

/// Reads the binary triangle count, if the buffer is long enough to hold one
fn binary_triangle_count(bytes: &[u8]) -> Option<u32> {
    let raw = bytes.get(BINARY_HEADER_LEN..BINARY_PREAMBLE_LEN)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Guesses the encoding of an STL buffer.
///
/// A buffer that opens with `solid` is text, unless its length is exactly the
/// length a binary file with the declared triangle count would have. Some CAD
/// exporters write `solid` into the binary header, so that case is read as
/// binary. A binary file that starts with `solid` and also carries trailing
/// bytes is still misread as text.
pub fn detect_format(bytes: &[u8]) -> StlFormat {
    if !bytes.starts_with(ASCII_MARKER) {
        return StlFormat::Binary;
    }

    match binary_triangle_count(bytes) {
        Some(count)
            if count > 0
                && bytes.len() as u64
                    == BINARY_PREAMBLE_LEN as u64 + count as u64 * BINARY_TRIANGLE_LEN as u64 =>
        {
            warn!("STL header starts with 'solid' but its size matches a binary body; reading as binary");
            StlFormat::Binary
        }
        _ => StlFormat::Ascii,
    }
}

/// Parses three whitespace separated floats
///
/// # Arguments
/// * `tokens` - Iterator positioned on the first coordinate
/// * `line_number` - One-based line number, used in error messages
fn parse_coordinates<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    line_number: usize,
) -> Result<Vertex> {
    let mut coords = [0.0f32; 3];
    for coord in coords.iter_mut() {
        let token = tokens.next().ok_or_else(|| {
            EdgePredictError::Parse(format!("Missing coordinate on line {line_number}"))
        })?;
        *coord = token.parse().map_err(|_| {
            EdgePredictError::Parse(format!(
                "Non-float coordinate '{token}' on line {line_number}"
            ))
        })?;
    }

    Ok(Vertex::new(coords[0], coords[1], coords[2]))
}

/// Pulls the next line, numbered from one
fn next_line<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    expected: &str,
) -> Result<(usize, &'a str)> {
    lines
        .next()
        .map(|(i, line)| (i + 1, line))
        .ok_or_else(|| EdgePredictError::Parse(format!("Unexpected end of file, expected {expected}")))
}

/// Parses a text-encoded STL body into triangles
///
/// # Arguments
/// * `contents` - The full file contents, including the `solid` line
///
/// # Returns
/// The triangles in file order
pub fn parse_ascii(contents: &str) -> Result<Vec<Triangle>> {
    let mut triangles: Vec<Triangle> = Vec::new();
    // skip the opening "solid ..." declaration
    let mut lines = contents.lines().enumerate().skip(1);

    while let Some((index, line)) = lines.next() {
        let line_number = index + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("endsolid") => break,
            Some("facet") => {
                // "normal" keyword
                tokens.next();
                let normal = parse_coordinates(tokens, line_number)?;

                next_line(&mut lines, "outer loop")?;

                let mut vertices = [Vertex::default(); 3];
                for vertex in vertices.iter_mut() {
                    let (line_number, line) = next_line(&mut lines, "vertex")?;
                    *vertex = parse_coordinates(line.split_whitespace().skip(1), line_number)?;
                }

                next_line(&mut lines, "endloop")?;
                next_line(&mut lines, "endfacet")?;

                triangles.push(Triangle { normal, vertices });
            }
            _ => continue,
        }
    }

    if triangles.is_empty() {
        return Err(EdgePredictError::Parse(
            "No triangles were read from the STL file".to_owned(),
        ));
    }

    Ok(triangles)
}

fn read_vertex(chunk: &[u8]) -> Vertex {
    let coord = |i: usize| f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);
    Vertex::new(coord(0), coord(4), coord(8))
}

/// Parses a binary STL buffer into triangles
///
/// # Arguments
/// * `bytes` - The full file contents, including the 80 byte header
///
/// # Returns
/// The triangles in file order
pub fn parse_binary(bytes: &[u8]) -> Result<Vec<Triangle>> {
    let num_triangles = binary_triangle_count(bytes).ok_or_else(|| {
        EdgePredictError::Parse(format!(
            "Binary STL is {} bytes, too short for its {BINARY_PREAMBLE_LEN} byte preamble",
            bytes.len()
        ))
    })? as usize;

    let body = &bytes[BINARY_PREAMBLE_LEN..];
    let available = body.len() / BINARY_TRIANGLE_LEN;
    if available < num_triangles {
        return Err(EdgePredictError::Parse(format!(
            "Binary STL declares {num_triangles} triangles but only holds {available}"
        )));
    }

    let triangles: Vec<Triangle> = body
        .chunks_exact(BINARY_TRIANGLE_LEN)
        .take(num_triangles)
        .map(|record| Triangle {
            normal: read_vertex(&record[0..12]),
            vertices: [
                read_vertex(&record[12..24]),
                read_vertex(&record[24..36]),
                read_vertex(&record[36..48]),
            ],
            // record[48..50] is the attribute byte count, discarded
        })
        .collect();

    if triangles.is_empty() {
        return Err(EdgePredictError::Parse(
            "No triangles were read from the STL file".to_owned(),
        ));
    }

    Ok(triangles)
}

/// Reads an STL file of either encoding
///
/// # Arguments
/// * `stl_file` - The path to the mesh file
///
/// # Returns
/// The triangles in file order
pub fn read(stl_file: &Path) -> Result<Vec<Triangle>> {
    let bytes = std::fs::read(stl_file).map_err(|err| {
        EdgePredictError::File(format!(
            "Could not open STL file {}: {err}",
            stl_file.display()
        ))
    })?;

    match detect_format(&bytes) {
        StlFormat::Ascii => {
            info!("detected ASCII STL format");
            parse_ascii(&String::from_utf8_lossy(&bytes))
        }
        StlFormat::Binary => {
            info!("detected binary STL format");
            parse_binary(&bytes)
        }
    }
}

/// Encodes triangles as a binary STL buffer
#[cfg(test)]
pub(crate) fn encode_binary(header: &[u8], triangles: &[Triangle]) -> Vec<u8> {
    let mut bytes = vec![0u8; BINARY_HEADER_LEN];
    bytes[..header.len()].copy_from_slice(header);
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for tri in triangles {
        for v in std::iter::once(&tri.normal).chain(tri.vertices.iter()) {
            for c in [v.x, v.y, v.z] {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&[0, 0]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TWO_FACETS: &str = "solid square
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 1 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 1 0
      vertex 0 1 0
    endloop
  endfacet
endsolid square
";

    fn square() -> Vec<Triangle> {
        let n = Vertex::new(0.0, 0.0, 1.0);
        vec![
            Triangle {
                normal: n,
                vertices: [
                    Vertex::new(0.0, 0.0, 0.0),
                    Vertex::new(1.0, 0.0, 0.0),
                    Vertex::new(1.0, 1.0, 0.0),
                ],
            },
            Triangle {
                normal: n,
                vertices: [
                    Vertex::new(0.0, 0.0, 0.0),
                    Vertex::new(1.0, 1.0, 0.0),
                    Vertex::new(0.0, 1.0, 0.0),
                ],
            },
        ]
    }

    #[test]
    fn test_parse_ascii_in_file_order() {
        let triangles = parse_ascii(TWO_FACETS).unwrap();
        assert_eq!(triangles, square());
    }

    #[test]
    fn test_ascii_stops_at_endsolid() {
        let contents = format!("{TWO_FACETS}  facet normal 0 0 1\n garbage\n");
        assert_eq!(parse_ascii(&contents).unwrap().len(), 2);
    }

    #[test]
    fn test_ascii_ignores_unknown_lines() {
        let contents = TWO_FACETS.replacen("solid square\n", "solid square\n  color 1 2 3\n\n", 1);
        assert_eq!(parse_ascii(&contents).unwrap().len(), 2);
    }

    #[test]
    fn test_ascii_crlf_line_endings() {
        let contents = TWO_FACETS.replace('\n', "\r\n");
        assert_eq!(parse_ascii(&contents).unwrap(), square());
    }

    #[test]
    fn test_ascii_malformed_vertex() {
        let contents = TWO_FACETS.replacen("vertex 1 0 0", "vertex 1 zero 0", 1);
        let err = parse_ascii(&contents).unwrap_err();
        assert!(matches!(err, EdgePredictError::Parse(msg) if msg.contains("line 5")));
    }

    #[test]
    fn test_ascii_truncated_facet() {
        let contents = "solid cut\n  facet normal 0 0 1\n    outer loop\n      vertex 0 0 0\n";
        assert!(matches!(
            parse_ascii(contents),
            Err(EdgePredictError::Parse(_))
        ));
    }

    #[test]
    fn test_ascii_without_facets() {
        assert!(matches!(
            parse_ascii("solid empty\nendsolid empty\n"),
            Err(EdgePredictError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_binary() {
        let bytes = encode_binary(b"binary square", &square());
        assert_eq!(detect_format(&bytes), StlFormat::Binary);
        assert_eq!(parse_binary(&bytes).unwrap(), square());
    }

    #[test]
    fn test_binary_zero_triangles() {
        let bytes = encode_binary(b"empty", &[]);
        assert!(matches!(
            parse_binary(&bytes),
            Err(EdgePredictError::Parse(_))
        ));
    }

    #[test]
    fn test_binary_truncated_body() {
        let mut bytes = encode_binary(b"cut", &square());
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            parse_binary(&bytes),
            Err(EdgePredictError::Parse(_))
        ));
    }

    #[test]
    fn test_binary_with_solid_header() {
        let bytes = encode_binary(b"solid exported by a CAD tool", &square());
        assert_eq!(detect_format(&bytes), StlFormat::Binary);

        // trailing bytes defeat the size check, so the sniff wins
        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(detect_format(&padded), StlFormat::Ascii);
    }

    #[test]
    fn test_detect_ascii() {
        assert_eq!(detect_format(TWO_FACETS.as_bytes()), StlFormat::Ascii);
        assert_eq!(detect_format(b"sol"), StlFormat::Binary);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read(Path::new("does/not/exist.stl")).unwrap_err();
        assert!(matches!(err, EdgePredictError::File(_)));
    }

    #[test]
    fn test_read_both_encodings_from_disk() {
        let mut ascii = NamedTempFile::new().unwrap();
        write!(ascii, "{TWO_FACETS}").unwrap();
        let mut binary = NamedTempFile::new().unwrap();
        binary.write_all(&encode_binary(b"", &square())).unwrap();

        assert_eq!(read(ascii.path()).unwrap(), read(binary.path()).unwrap());
    }
}
