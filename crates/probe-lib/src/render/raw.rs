//! Parser for the textual listing printed by `go tool pprof -raw`
//!
//! The listing has a header, a `Samples:` section whose first line names
//! the sample types (`samples/count cpu/nanoseconds`) followed by one line
//! per sample (`<v1> <v2> ...: <loc-id> <loc-id> ...`, leaf first), then a
//! `Locations` section mapping location ids to one or more function names
//! (inlined callers on continuation lines), then `Mappings`.

use crate::error::{ProbeError, RenderStage, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A single stack sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    pub values: Vec<i64>,
    /// Location ids, leaf first
    pub location_ids: Vec<u64>,
}

/// Profile model recovered from a raw listing
#[derive(Debug, Clone, Default)]
pub struct RawProfile {
    /// Sample type names such as `alloc_space/bytes`
    pub sample_names: Vec<String>,
    pub samples: Vec<RawSample>,
    /// Function names per location, innermost first
    pub locations: HashMap<u64, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    SampleNames,
    Samples,
    Locations,
    Mappings,
}

impl RawProfile {
    /// Parse the textual listing
    pub fn parse(text: &str) -> Result<Self> {
        let mut profile = RawProfile::default();
        let mut section = Section::Header;
        let mut current_location: Option<u64> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match trimmed {
                "Samples:" => {
                    section = Section::SampleNames;
                    continue;
                }
                "Locations" => {
                    section = Section::Locations;
                    continue;
                }
                "Mappings" => {
                    section = Section::Mappings;
                    continue;
                }
                _ => {}
            }

            match section {
                Section::Header | Section::Mappings => {}
                Section::SampleNames => {
                    profile.sample_names = trimmed
                        .split_whitespace()
                        .map(|name| name.trim_end_matches("[dflt]").to_string())
                        .collect();
                    section = Section::Samples;
                }
                Section::Samples => {
                    // Label lines (`bytes:[64]`) have a non-numeric head and are skipped
                    if let Some(sample) = parse_sample_line(trimmed)? {
                        profile.samples.push(sample);
                    }
                }
                Section::Locations => {
                    if let Some((id, rest)) = split_location_line(trimmed) {
                        current_location = Some(id);
                        let names = profile.locations.entry(id).or_default();
                        if let Some(name) = location_function(rest) {
                            names.push(name);
                        }
                    } else if let Some(id) = current_location {
                        // Continuation line: an inlined caller of the previous line
                        if let Some(name) = trimmed.split_whitespace().next() {
                            profile
                                .locations
                                .entry(id)
                                .or_default()
                                .push(name.to_string());
                        }
                    }
                }
            }
        }

        if profile.sample_names.is_empty() {
            return Err(ProbeError::render(
                RenderStage::Parse,
                "listing has no Samples section",
            ));
        }
        Ok(profile)
    }

    /// Resolve a sample selector to an index into each sample's values
    ///
    /// An empty selector picks the first sample type. Otherwise the selector
    /// matches a sample type name with or without its unit.
    pub fn select_sample(&self, selector: &str) -> usize {
        let selector = selector.trim();
        if selector.is_empty() {
            return 0;
        }

        let found = self.sample_names.iter().position(|name| {
            name == selector || name.split('/').next() == Some(selector)
        });
        match found {
            Some(index) => index,
            None => {
                warn!(
                    selector = %selector,
                    available = ?self.sample_names,
                    "Sample selector matched nothing, using first sample type"
                );
                0
            }
        }
    }

    /// Build flame-graph input: one `root;...;leaf <count>` line per stack
    ///
    /// Identical stacks are merged and the output is sorted, so the same
    /// listing always yields the same input.
    pub fn flame_input(&self, sample_index: usize) -> Result<Vec<String>> {
        let mut stacks: BTreeMap<String, i64> = BTreeMap::new();

        for sample in &self.samples {
            let count = *sample.values.get(sample_index).ok_or_else(|| {
                ProbeError::render(
                    RenderStage::FlameInput,
                    format!(
                        "sample index {} out of range for {} values",
                        sample_index,
                        sample.values.len()
                    ),
                )
            })?;
            if count == 0 {
                continue;
            }

            let mut frames: Vec<&str> = Vec::new();
            for id in &sample.location_ids {
                let names = self.locations.get(id).ok_or_else(|| {
                    ProbeError::render(
                        RenderStage::FlameInput,
                        format!("sample references unknown location {id}"),
                    )
                })?;
                if names.is_empty() {
                    frames.push("??");
                } else {
                    frames.extend(names.iter().map(String::as_str));
                }
            }
            if frames.is_empty() {
                continue;
            }

            frames.reverse();
            *stacks.entry(frames.join(";")).or_insert(0) += count;
        }

        Ok(stacks
            .into_iter()
            .map(|(stack, count)| format!("{stack} {count}"))
            .collect())
    }
}

fn parse_sample_line(line: &str) -> Result<Option<RawSample>> {
    let Some((head, tail)) = line.split_once(':') else {
        return Ok(None);
    };

    let values: Option<Vec<i64>> = head
        .split_whitespace()
        .map(|v| v.parse::<i64>().ok())
        .collect();
    let values = match values {
        Some(values) if !values.is_empty() => values,
        _ => return Ok(None),
    };

    let location_ids = tail
        .split_whitespace()
        .map(|id| {
            id.parse::<u64>().map_err(|_| {
                ProbeError::render(
                    RenderStage::Parse,
                    format!("invalid location id {id:?} in sample line"),
                )
            })
        })
        .collect::<Result<Vec<u64>>>()?;

    Ok(Some(RawSample {
        values,
        location_ids,
    }))
}

/// Split `<id>: <rest>`; `None` for continuation lines
fn split_location_line(line: &str) -> Option<(u64, &str)> {
    let (head, rest) = line.split_once(':')?;
    let id = head.trim().parse::<u64>().ok()?;
    Some((id, rest.trim()))
}

/// Function name from `0x4a1b2c M=1 [F] main.work /src/main.go:12 s=0`
fn location_function(rest: &str) -> Option<String> {
    rest.split_whitespace()
        .find(|token| {
            !token.starts_with("0x") && !token.starts_with("M=") && *token != "[F]"
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAP_LISTING: &str = "PeriodType: space bytes
Period: 524288
Time: 2023-11-14 22:13:20.000000000 +0000 UTC
Samples:
alloc_objects/count alloc_space/bytes inuse_objects/count inuse_space/bytes[dflt]
          4     524288          0          0: 1 2 3
                bytes:[131072]
          2     262144          2     262144: 4 3
                bytes:[131072]
          1     131072          0          0: 1 2 3
Locations
     1: 0x4a1b2c M=1 main.allocate /src/main.go:40 s=38
     2: 0x4a1c00 M=1 main.handle /src/main.go:22 s=20
             main.serve /src/main.go:15 s=14
     3: 0x437f01 M=1 runtime.main /usr/local/go/src/runtime/proc.go:250 s=145
     4: 0x4a1d10 M=1 main.cache /src/cache.go:9 s=8
Mappings
1: 0x400000/0x5c4000/0x0 /app/server  [FN]
";

    #[test]
    fn test_parse_sections() {
        let profile = RawProfile::parse(HEAP_LISTING).unwrap();
        assert_eq!(
            profile.sample_names,
            vec![
                "alloc_objects/count",
                "alloc_space/bytes",
                "inuse_objects/count",
                "inuse_space/bytes"
            ]
        );
        assert_eq!(profile.samples.len(), 3);
        assert_eq!(profile.samples[1].location_ids, vec![4, 3]);
        assert_eq!(
            profile.locations[&2],
            vec!["main.handle".to_string(), "main.serve".to_string()]
        );
    }

    #[test]
    fn test_flame_input_merges_stacks_root_first() {
        let profile = RawProfile::parse(HEAP_LISTING).unwrap();
        let lines = profile.flame_input(0).unwrap();
        assert_eq!(
            lines,
            vec![
                "runtime.main;main.cache 2".to_string(),
                "runtime.main;main.serve;main.handle;main.allocate 5".to_string(),
            ]
        );
    }

    #[test]
    fn test_flame_input_skips_zero_weights() {
        let profile = RawProfile::parse(HEAP_LISTING).unwrap();
        let index = profile.select_sample("inuse_space");
        assert_eq!(index, 3);
        let lines = profile.flame_input(index).unwrap();
        assert_eq!(lines, vec!["runtime.main;main.cache 262144".to_string()]);
    }

    #[test]
    fn test_select_sample_defaults_to_first() {
        let profile = RawProfile::parse(HEAP_LISTING).unwrap();
        assert_eq!(profile.select_sample(""), 0);
        assert_eq!(profile.select_sample("alloc_space/bytes"), 1);
        assert_eq!(profile.select_sample("no_such_sample"), 0);
    }

    #[test]
    fn test_flame_input_is_deterministic() {
        let first = RawProfile::parse(HEAP_LISTING)
            .unwrap()
            .flame_input(1)
            .unwrap();
        let second = RawProfile::parse(HEAP_LISTING)
            .unwrap()
            .flame_input(1)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_profile_yields_no_input() {
        let listing = "PeriodType: cpu nanoseconds\nSamples:\nsamples/count cpu/nanoseconds\nLocations\nMappings\n";
        let profile = RawProfile::parse(listing).unwrap();
        assert!(profile.flame_input(0).unwrap().is_empty());
    }

    #[test]
    fn test_missing_samples_section_is_parse_error() {
        let result = RawProfile::parse("not a profile listing");
        assert!(matches!(
            result,
            Err(ProbeError::Render {
                stage: RenderStage::Parse,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_location_is_error() {
        let listing = "Samples:\nsamples/count\n 1: 99\nLocations\n     1: 0x1 M=1 main.f /a.go:1 s=0\n";
        let profile = RawProfile::parse(listing).unwrap();
        assert!(profile.flame_input(0).is_err());
    }
}
