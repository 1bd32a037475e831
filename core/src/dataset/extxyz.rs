//! Extended XYZ files holding one configuration each.
//!
//! ```text
//! 8
//! Lattice="5.43 0 0 0 5.43 0 0 0 5.43" PBC="1 1 1" Energy=-34.69
//! Si 0.0 0.0 0.0 0.01 -0.02 0.0
//! ...
//! ```
//!
//! The comment line holds `key=value` pairs. Recognized keys are `Lattice`
//! (lattice vectors, row after row), `PBC` (`1`/`0` or `T`/`F`), `Energy`,
//! `Stress` (Voigt order) and `Weight`; others are ignored. Atom lines
//! carry the species, the coordinates and optionally the forces.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use nalgebra::{Matrix3, Vector3};

use crate::{configuration::Configuration, KliffError, Result};

struct Parser<'a> {
    path: &'a Path,
}

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> KliffError {
        KliffError::Parse {
            path: self.path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    fn numbers<const N: usize>(&self, line: usize, key: &str, value: &str) -> Result<[f64; N]> {
        let numbers = value
            .split_whitespace()
            .map(|x| x.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| self.error(line, format!("{key}: {err}")))?;

        numbers
            .try_into()
            .map_err(|numbers: Vec<f64>| self.error(line, format!("{key}: expected {N} numbers, got {}", numbers.len())))
    }

    fn number(&self, line: usize, key: &str, value: &str) -> Result<f64> {
        value
            .trim()
            .parse()
            .map_err(|err| self.error(line, format!("{key}: {err}")))
    }

    fn pbc(&self, line: usize, value: &str) -> Result<[bool; 3]> {
        let flags = value
            .split_whitespace()
            .map(|flag| match flag {
                "1" | "T" | "t" | "True" | "true" => Ok(true),
                "0" | "F" | "f" | "False" | "false" => Ok(false),
                other => Err(self.error(line, format!("PBC: invalid flag {other:?}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        flags
            .try_into()
            .map_err(|_| self.error(line, "PBC: expected 3 flags"))
    }
}

/// Split `key=value key="quoted value"` into pairs.
fn key_values(line: &str) -> std::result::Result<Vec<(&str, &str)>, String> {
    let mut pairs = Vec::new();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        let Some((key, tail)) = rest.split_once('=') else {
            return Err(format!("expected key=value, got {rest:?}"));
        };
        let key = key.trim();
        let tail = tail.trim_start();

        let (value, tail) = if let Some(quoted) = tail.strip_prefix('"') {
            quoted
                .split_once('"')
                .ok_or_else(|| format!("unterminated quote in value of {key}"))?
        } else {
            tail.split_once(char::is_whitespace).unwrap_or((tail, ""))
        };

        pairs.push((key, value));
        rest = tail.trim_start();
    }

    Ok(pairs)
}

pub fn read(path: impl AsRef<Path>) -> Result<Configuration> {
    let path = path.as_ref();
    let parser = Parser { path };
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

    let (_, count) = lines.next().ok_or_else(|| parser.error(1, "empty file"))?;
    let num_atoms = count
        .trim()
        .parse::<usize>()
        .map_err(|err| parser.error(1, format!("number of atoms: {err}")))?;

    let (_, comment) = lines.next().ok_or_else(|| parser.error(2, "missing comment line"))?;
    let pairs = key_values(comment).map_err(|message| parser.error(2, message))?;

    let mut cell = None;
    let mut pbc = None;
    let mut energy = None;
    let mut stress = None;
    let mut weight = None;
    for (key, value) in pairs {
        match key.to_ascii_lowercase().as_str() {
            "lattice" => cell = Some(Matrix3::from_row_slice(&parser.numbers::<9>(2, key, value)?)),
            "pbc" => pbc = Some(parser.pbc(2, value)?),
            "energy" => energy = Some(parser.number(2, key, value)?),
            "stress" => stress = Some(parser.numbers::<6>(2, key, value)?),
            "weight" => weight = Some(parser.number(2, key, value)?),
            _ => log::trace!("{}: ignoring {key}", path.display()),
        }
    }

    // the header count is only trusted as far as the file has lines
    let capacity = num_atoms.min(text.lines().count());
    let mut species = Vec::with_capacity(capacity);
    let mut coords = Vec::with_capacity(capacity);
    let mut forces = Vec::with_capacity(capacity);
    for _ in 0..num_atoms {
        let (line, text) = lines
            .next()
            .ok_or_else(|| parser.error(2 + species.len() + 1, format!("expected {num_atoms} atoms")))?;

        let columns = text.split_whitespace().collect::<Vec<_>>();
        let parse = |column: &str| parser.number(line, "atom", column);
        match *columns.as_slice() {
            [s, x, y, z] => {
                species.push(s.to_string());
                coords.push(Vector3::new(parse(x)?, parse(y)?, parse(z)?));
            }
            [s, x, y, z, fx, fy, fz, ..] => {
                species.push(s.to_string());
                coords.push(Vector3::new(parse(x)?, parse(y)?, parse(z)?));
                forces.push(Vector3::new(parse(fx)?, parse(fy)?, parse(fz)?));
            }
            _ => return Err(parser.error(line, "expected species, 3 coordinates and optionally 3 forces")),
        }
    }

    if !forces.is_empty() && forces.len() != num_atoms {
        return Err(parser.error(2, "forces given for some atoms only"));
    }

    let pbc = pbc.unwrap_or([cell.is_some(); 3]);
    let mut config = Configuration::new(cell.unwrap_or_else(Matrix3::zeros), pbc, species, coords)?
        .with_identifier(path.display().to_string());
    if let Some(energy) = energy {
        config = config.with_energy(energy);
    }
    if !forces.is_empty() {
        config = config.with_forces(forces)?;
    }
    if let Some(stress) = stress {
        config = config.with_stress(stress);
    }
    if let Some(weight) = weight {
        config = config.with_weight(weight);
    }

    Ok(config)
}

pub fn write(path: impl AsRef<Path>, config: &Configuration) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_config(&mut writer, config)?;
    writer.flush()?;
    Ok(())
}

fn write_config(out: &mut impl Write, config: &Configuration) -> std::io::Result<()> {
    let flag = |periodic: bool| if periodic { "1" } else { "0" };

    writeln!(out, "{}", config.num_atoms())?;
    let lattice = config.cell().transpose().iter().map(|x| format!("{x:.16e}")).collect::<Vec<_>>();
    write!(
        out,
        "Lattice=\"{}\" PBC=\"{} {} {}\"",
        lattice.join(" "),
        flag(config.pbc()[0]),
        flag(config.pbc()[1]),
        flag(config.pbc()[2])
    )?;
    if let Some(energy) = config.energy() {
        write!(out, " Energy={energy:.16e}")?;
    }
    if let Some(stress) = config.stress() {
        let stress = stress.iter().map(|x| format!("{x:.16e}")).collect::<Vec<_>>();
        write!(out, " Stress=\"{}\"", stress.join(" "))?;
    }
    if config.weight() != 1.0 {
        write!(out, " Weight={:.16e}", config.weight())?;
    }
    writeln!(out)?;

    for (i, (species, r)) in config.species().iter().zip(config.coords()).enumerate() {
        write!(out, "{species:<3} {:24.16e} {:24.16e} {:24.16e}", r.x, r.y, r.z)?;
        if let Some(forces) = config.forces() {
            let f = forces[i];
            write!(out, " {:24.16e} {:24.16e} {:24.16e}", f.x, f.y, f.z)?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Files with the `xyz` extension directly inside `dir`, sorted
pub fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "xyz") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use super::{key_values, read, write};
    use crate::KliffError;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kliff-{}-{name}", std::process::id()))
    }

    #[test]
    fn comment_line_pairs() {
        let pairs = key_values(r#"Lattice="1 0 0 0 1 0 0 0 1" PBC="T T F"  Energy=-1.5 Properties=species:S:1:pos:R:3"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Lattice", "1 0 0 0 1 0 0 0 1"),
                ("PBC", "T T F"),
                ("Energy", "-1.5"),
                ("Properties", "species:S:1:pos:R:3"),
            ]
        );
        assert!(key_values(r#"Lattice="1 0 0"#).is_err());
        assert!(key_values("Energy").is_err());
    }

    #[test]
    fn reads_reference_data() {
        let path = scratch("read.xyz");
        std::fs::write(
            &path,
            "2\n\
             Lattice=\"4 0 0 0 5 0 0 0 6\" PBC=\"1 1 0\" Energy=-3.25 Stress=\"1 2 3 4 5 6\" Weight=0.5\n\
             Si 0.0 0.0 0.0 0.1 0.2 0.3\n\
             C  1.0 2.0 3.0 -0.1 -0.2 -0.3\n",
        )
        .unwrap();
        let config = read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.num_atoms(), 2);
        assert_eq!(config.species(), &["Si".to_string(), "C".to_string()]);
        assert_eq!(config.pbc(), [true, true, false]);
        assert_eq!(config.cell(), &Matrix3::from_diagonal(&Vector3::new(4.0, 5.0, 6.0)));
        assert_eq!(config.energy(), Some(-3.25));
        assert_eq!(config.stress(), Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(config.weight(), 0.5);
        assert_eq!(config.forces().unwrap()[1], Vector3::new(-0.1, -0.2, -0.3));
    }

    #[test]
    fn parse_errors_name_the_line() {
        let path = scratch("broken.xyz");
        std::fs::write(&path, "2\nPBC=\"1 1 1\"\nSi 0 0 0\nSi 0 zero 0\n").unwrap();
        let err = read(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        match err {
            KliffError::Parse { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn truncated_file() {
        let path = scratch("truncated.xyz");
        std::fs::write(&path, "3\n\nAr 0 0 0\n").unwrap();
        let err = read(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, KliffError::Parse { .. }));
    }

    #[test]
    fn absurd_atom_count_is_a_parse_error() {
        let path = scratch("huge.xyz");
        std::fs::write(&path, "100000000000000\n\nAr 0 0 0\n").unwrap();
        let err = read(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, KliffError::Parse { line: 4, .. }));
    }

    #[test]
    fn write_then_read() {
        let config = crate::testing::diamond_silicon(5.43, 1)
            .with_energy(-34.5)
            .with_stress([0.1, 0.2, 0.3, 0.0, 0.0, -0.1])
            .with_weight(2.0);
        let config = config
            .clone()
            .with_forces(vec![Vector3::new(0.5, -0.25, 1e-3); config.num_atoms()])
            .unwrap();

        let path = scratch("roundtrip.xyz");
        write(&path, &config).unwrap();
        let loaded = read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.species(), config.species());
        assert_eq!(loaded.pbc(), config.pbc());
        assert_relative_eq!(*loaded.cell(), *config.cell(), epsilon = 1e-12);
        for (a, b) in loaded.coords().iter().zip(config.coords()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_eq!(loaded.energy(), config.energy());
        assert_eq!(loaded.stress(), config.stress());
        assert_eq!(loaded.weight(), 2.0);
        assert_eq!(loaded.forces(), config.forces());
    }
}
