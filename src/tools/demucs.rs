// Source separation
// Invokes demucs on a decoded segment and locates the folder of stem WAVs it produced

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::{run_tool, ToolError};

const DEMUCS: &str = "demucs";

/// Default separation model
pub const DEFAULT_MODEL: &str = "htdemucs";

pub fn separator_args(model: &str, out_dir: &Path, input_wav: &Path) -> Vec<OsString> {
    vec![
        "-n".into(),
        model.into(),
        "--out".into(),
        out_dir.as_os_str().to_owned(),
        input_wav.as_os_str().to_owned(),
    ]
}

/// Candidate stem folders for a track, in lookup order
pub fn stems_dir_candidates(out_dir: &Path, model: &str, track_name: &str) -> [PathBuf; 2] {
    [
        out_dir.join("separated").join(model).join(track_name),
        out_dir.join(model).join(track_name),
    ]
}

/// First candidate folder that contains at least one WAV file
pub fn locate_stems_dir(out_dir: &Path, model: &str, track_name: &str) -> Option<PathBuf> {
    stems_dir_candidates(out_dir, model, track_name)
        .into_iter()
        .find(|dir| contains_wav(dir))
}

/// Separate `input_wav` into stems under `out_dir`, returning the stems folder
pub fn run_separator(input_wav: &Path, out_dir: &Path, model: &str) -> Result<PathBuf, ToolError> {
    log::info!("Separating {} with model {}", input_wav.display(), model);
    run_tool(DEMUCS, &separator_args(model, out_dir, input_wav))?;

    let track_name = input_wav
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    locate_stems_dir(out_dir, model, &track_name).ok_or_else(|| {
        let searched = stems_dir_candidates(out_dir, model, &track_name)
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" and ");
        ToolError::StemsNotFound { searched }
    })
}

fn contains_wav(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries.filter_map(Result::ok).any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_separator_args() {
        let args: Vec<String> = separator_args("htdemucs_6s", Path::new("out"), Path::new("seg.wav"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-n", "htdemucs_6s", "--out", "out", "seg.wav"]);
    }

    #[test]
    fn test_locate_prefers_separated_folder() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let [separated, direct] = stems_dir_candidates(root, "htdemucs", "__segment__ab12cd34");
        fs::create_dir_all(&separated).unwrap();
        fs::create_dir_all(&direct).unwrap();
        fs::write(direct.join("drums.wav"), b"x").unwrap();

        // Only the direct folder has WAVs
        assert_eq!(
            locate_stems_dir(root, "htdemucs", "__segment__ab12cd34"),
            Some(direct.clone())
        );

        fs::write(separated.join("bass.WAV"), b"x").unwrap();
        assert_eq!(
            locate_stems_dir(root, "htdemucs", "__segment__ab12cd34"),
            Some(separated)
        );
    }

    #[test]
    fn test_locate_ignores_folders_without_wavs() {
        let temp_dir = TempDir::new().unwrap();
        let [_, direct] = stems_dir_candidates(temp_dir.path(), "m", "t");
        fs::create_dir_all(&direct).unwrap();
        fs::write(direct.join("log.txt"), b"x").unwrap();

        assert_eq!(locate_stems_dir(temp_dir.path(), "m", "t"), None);
    }
}
