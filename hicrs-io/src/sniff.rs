//! Cheap format detection. The sniffers only look at the leading magic
//! number and never fail: unreadable paths simply do not look like anything.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::codec::Magic;
use crate::container::{MCOOL_MAGIC, SCOOL_MAGIC};
use crate::cool::COOL_MAGIC;
use crate::hic::HIC_MAGIC;

fn read_magic(path: &Path) -> Option<Magic> {
    if !path.is_file() {
        return None;
    }
    let mut file = File::open(path).ok()?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic).ok()?;
    Some(magic)
}

fn has_magic<P: AsRef<Path>>(path: P, expected: &Magic) -> bool {
    read_magic(path.as_ref()).is_some_and(|magic| &magic == expected)
}

pub fn looks_like_coolerfile<P: AsRef<Path>>(path: P) -> bool {
    has_magic(path, &COOL_MAGIC)
}

pub fn looks_like_hicfile<P: AsRef<Path>>(path: P) -> bool {
    has_magic(path, &HIC_MAGIC)
}

pub fn looks_like_multires<P: AsRef<Path>>(path: P) -> bool {
    has_magic(path, &MCOOL_MAGIC)
}

pub fn looks_like_singlecell<P: AsRef<Path>>(path: P) -> bool {
    has_magic(path, &SCOOL_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tempfile::TempDir;

    #[rstest]
    #[case(b"HRSCOOL\x01\x01\x00\x00\x00", true, false, false, false)]
    #[case(b"HRSHIC\x00\x01\x01\x00\x00\x00", false, true, false, false)]
    #[case(b"HRSMCOOL\x01\x00\x00\x00", false, false, true, false)]
    #[case(b"HRSSCOOL\x01\x00\x00\x00", false, false, false, true)]
    #[case(b"HRS", false, false, false, false)]
    #[case(b"\x89HDF\r\n\x1a\n", false, false, false, false)]
    fn test_sniffers(
        #[case] content: &[u8],
        #[case] cool: bool,
        #[case] hic: bool,
        #[case] mcool: bool,
        #[case] scool: bool,
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("matrix");
        std::fs::write(&path, content).unwrap();

        assert_eq!(looks_like_coolerfile(&path), cool);
        assert_eq!(looks_like_hicfile(&path), hic);
        assert_eq!(looks_like_multires(&path), mcool);
        assert_eq!(looks_like_singlecell(&path), scool);
    }

    #[rstest]
    fn test_missing_paths_and_directories() {
        let dir = TempDir::new().unwrap();
        assert!(!looks_like_coolerfile(dir.path()));
        assert!(!looks_like_hicfile(dir.path().join("missing.hic")));
        assert!(!looks_like_multires(dir.path().join("missing.mcool")));
        assert!(!looks_like_singlecell(""));
    }
}
