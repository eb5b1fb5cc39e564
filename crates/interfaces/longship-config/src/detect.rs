//! Guessing where Valheim is installed.

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tracing::debug;

const WINDOWS_DRIVES: &[char] = &['C', 'D', 'E', 'F', 'G', 'H'];

/// Steam library roots, relative to a drive, that may hold `steamapps/common/Valheim`.
const WINDOWS_LIBRARIES: &[&str] = &[
    r"Program Files (x86)\Steam",
    r"Program Files\Steam",
    "SteamLibrary",
];

/// Steam installs below the user's home on Linux and macOS.
const HOME_LIBRARIES: &[&str] = &[
    ".steam/steam",
    ".local/share/Steam",
    "Library/Application Support/Steam",
];

fn windows_candidates() -> Vec<Utf8PathBuf> {
    let mut dirs = Vec::new();
    for lib in WINDOWS_LIBRARIES {
        for drive in WINDOWS_DRIVES {
            dirs.push(Utf8PathBuf::from(format!(
                r"{drive}:\{lib}\steamapps\common\Valheim"
            )));
        }
    }
    for drive in WINDOWS_DRIVES {
        dirs.push(Utf8PathBuf::from(format!(r"{drive}:\Valheim")));
    }
    dirs
}

fn home_candidates(home: &Utf8Path) -> Vec<Utf8PathBuf> {
    let mut dirs = vec![home.join("valheim"), home.join("Valheim")];
    dirs.extend(
        HOME_LIBRARIES
            .iter()
            .map(|lib| home.join(lib).join("steamapps/common/Valheim")),
    );
    dirs
}

/// Every place worth probing, most likely first. Windows gets the fixed drive list,
/// other platforms get locations under `home`.
pub fn possible_game_dirs(home: Option<&Utf8Path>) -> Vec<Utf8PathBuf> {
    if cfg!(windows) {
        return windows_candidates();
    }
    home.map(home_candidates).unwrap_or_default()
}

/// Candidates under `home` that exist as directories.
pub fn candidate_game_dirs_in(home: Option<&Utf8Path>) -> Vec<Utf8PathBuf> {
    possible_game_dirs(home)
        .into_iter()
        .filter(|dir| {
            let found = dir.is_dir();
            debug!("checked {dir}: {}", if found { "found" } else { "absent" });
            found
        })
        .collect()
}

/// Existing game directory candidates for the current user.
pub fn candidate_game_dirs() -> Vec<Utf8PathBuf> {
    let home = BaseDirs::new()
        .and_then(|b| Utf8PathBuf::from_path_buf(b.home_dir().to_path_buf()).ok());
    candidate_game_dirs_in(home.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_list_covers_drives_and_libraries() {
        let dirs = windows_candidates();
        assert_eq!(dirs.len(), 24);
        assert_eq!(
            dirs[0].as_str(),
            r"C:\Program Files (x86)\Steam\steamapps\common\Valheim"
        );
        assert!(dirs.iter().any(|d| d.as_str() == r"D:\SteamLibrary\steamapps\common\Valheim"));
        assert_eq!(dirs.last().map(|d| d.as_str()), Some(r"H:\Valheim"));
    }

    #[cfg(not(windows))]
    #[test]
    fn only_existing_home_dirs_are_candidates() {
        let home = tempfile::tempdir().unwrap();
        let home = Utf8PathBuf::from_path_buf(home.path().to_path_buf()).unwrap();
        assert!(candidate_game_dirs_in(Some(&home)).is_empty());

        let steam = home.join(".local/share/Steam/steamapps/common/Valheim");
        std::fs::create_dir_all(&steam).unwrap();
        std::fs::write(home.join("valheim"), b"not a dir").unwrap();

        assert_eq!(candidate_game_dirs_in(Some(&home)), vec![steam]);
    }

    #[cfg(not(windows))]
    #[test]
    fn home_valheim_is_preferred_over_steam_library() {
        let home = tempfile::tempdir().unwrap();
        let home = Utf8PathBuf::from_path_buf(home.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(home.join("valheim")).unwrap();
        std::fs::create_dir_all(home.join(".steam/steam/steamapps/common/Valheim")).unwrap();

        let found = candidate_game_dirs_in(Some(&home));
        assert_eq!(found.first(), Some(&home.join("valheim")));
        assert!(candidate_game_dirs_in(None).is_empty());
    }
}
