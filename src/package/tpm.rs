//! Reader and writer for `.tpm` package definition files.
//!
//! A definition file is a small RDF/XML document:
//!
//! ```xml
//! <rdf:RDF xmlns:rdf="..." xmlns:TPM="...">
//!   <rdf:Description about="http://texpm/packages/amsmath">
//!     <TPM:Name>amsmath</TPM:Name>
//!     <TPM:RunFiles size="1234">texmf/tex/latex/amsmath/amsmath.sty ...</TPM:RunFiles>
//!     <TPM:Requires><TPM:Package name="amsfonts"/></TPM:Requires>
//!     <TPM:MD5>...</TPM:MD5>
//!   </rdf:Description>
//! </rdf:RDF>
//! ```

use anyhow::{Context, Result};
use log::debug;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::Path;

use super::{PackageInfo, strip_texmf_prefix};
use crate::error::PackageError;
use crate::runtime::Runtime;

const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const TPM_NAMESPACE: &str = "http://texlive.dante.de/";
const ABOUT_PREFIX: &str = "http://texpm.org/packages/";
const CREATOR: &str = "mpc";

/// Parse the definition file at `path`. The deployment name is the file stem.
#[tracing::instrument(skip(runtime))]
pub fn parse<R: Runtime>(runtime: &R, path: &Path) -> Result<PackageInfo> {
    let name = super::deployment_name_of(path)
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_default();
    let xml = runtime.read_to_string(path)?;
    parse_str(&name, &xml).map_err(|e| {
        PackageError::InvalidDefinition {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        }
        .into()
    })
}

/// Parse a definition document held in memory.
pub fn parse_str(deployment_name: &str, xml: &str) -> Result<PackageInfo> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut info = PackageInfo {
        deployment_name: deployment_name.to_string(),
        ..Default::default()
    };

    let mut seen_description = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().context("Malformed XML")? {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match tag.as_str() {
                    "rdf:Description" => seen_description = true,
                    "TPM:RunFiles" => info.size_run_files = size_attribute(&e)?,
                    "TPM:DocFiles" => info.size_doc_files = size_attribute(&e)?,
                    "TPM:SourceFiles" => info.size_source_files = size_attribute(&e)?,
                    "TPM:Package" => push_requirement(&mut info, &e)?,
                    _ => {}
                }
                current = Some(tag);
                text.clear();
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"TPM:Package" => push_requirement(&mut info, &e)?,
                b"rdf:Description" => seen_description = true,
                _ => {}
            },
            Event::Text(e) => {
                if current.is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if let Some(tag) = current.take() {
                    apply_element(&mut info, &tag, &text)?;
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_description {
        anyhow::bail!("missing rdf:Description element");
    }

    Ok(info)
}

fn size_attribute(e: &BytesStart) -> Result<u64> {
    match e.try_get_attribute("size")? {
        Some(attr) => {
            let value = attr.unescape_value()?;
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid size attribute: {:?}", value))
        }
        None => Ok(0),
    }
}

fn push_requirement(info: &mut PackageInfo, e: &BytesStart) -> Result<()> {
    if let Some(attr) = e.try_get_attribute("name")? {
        let name = attr.unescape_value()?;
        if !name.is_empty() {
            info.required_packages.push(name.into_owned());
        }
    }
    Ok(())
}

fn apply_element(info: &mut PackageInfo, tag: &str, text: &str) -> Result<()> {
    let text = text.trim();
    match tag {
        "TPM:Name" => info.display_name = text.to_string(),
        "TPM:Title" => info.title = text.to_string(),
        "TPM:Version" => info.version = text.to_string(),
        "TPM:TargetSystem" => info.target_system = text.to_string(),
        "TPM:Description" => info.description = text.to_string(),
        "TPM:RunFiles" => info.run_files = split_files(text),
        "TPM:DocFiles" => info.doc_files = split_files(text),
        "TPM:SourceFiles" => info.source_files = split_files(text),
        "TPM:TimePackaged" => {
            info.time_packaged = text
                .parse()
                .with_context(|| format!("Invalid packaged time: {:?}", text))?
        }
        "TPM:MD5" => info.digest = text.parse()?,
        _ => {}
    }
    Ok(())
}

fn split_files(text: &str) -> Vec<String> {
    text.split_whitespace().map(|s| s.to_string()).collect()
}

/// Serialize a record into its canonical definition document.
pub fn to_xml(info: &PackageInfo, time_packaged: i64) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("rdf:RDF").with_attributes([
        ("xmlns:rdf", RDF_NAMESPACE),
        ("xmlns:TPM", TPM_NAMESPACE),
    ])))?;

    let about = format!("{}{}", ABOUT_PREFIX, info.deployment_name);
    writer.write_event(Event::Start(
        BytesStart::new("rdf:Description").with_attributes([("about", about.as_str())]),
    ))?;

    write_text_element(&mut writer, "TPM:Name", &info.display_name)?;
    write_text_element(&mut writer, "TPM:Creator", CREATOR)?;
    write_text_element(&mut writer, "TPM:Title", &info.title)?;
    write_text_element(&mut writer, "TPM:Version", &info.version)?;
    write_text_element(&mut writer, "TPM:TargetSystem", &info.target_system)?;
    write_text_element(&mut writer, "TPM:Description", &info.description)?;

    write_file_list(&mut writer, "TPM:RunFiles", &info.run_files, info.size_run_files)?;
    write_file_list(&mut writer, "TPM:DocFiles", &info.doc_files, info.size_doc_files)?;
    write_file_list(
        &mut writer,
        "TPM:SourceFiles",
        &info.source_files,
        info.size_source_files,
    )?;

    if !info.required_packages.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("TPM:Requires")))?;
        for required in &info.required_packages {
            writer.write_event(Event::Empty(
                BytesStart::new("TPM:Package").with_attributes([("name", required.as_str())]),
            ))?;
        }
        writer.write_event(Event::End(BytesEnd::new("TPM:Requires")))?;
    }

    if time_packaged != 0 {
        write_text_element(&mut writer, "TPM:TimePackaged", &time_packaged.to_string())?;
    }

    write_text_element(&mut writer, "TPM:MD5", &info.digest.to_string())?;

    writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
    writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;

    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    if !text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_file_list(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    files: &[String],
    size: u64,
) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    let size = size.to_string();
    writer.write_event(Event::Start(
        BytesStart::new(tag).with_attributes([("size", size.as_str())]),
    ))?;
    writer.write_event(Event::Text(BytesText::new(&files.join(" "))))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Write a definition file, creating its parent directory if needed.
#[tracing::instrument(skip(runtime, info))]
pub fn write<R: Runtime>(
    runtime: &R,
    path: &Path,
    info: &PackageInfo,
    time_packaged: i64,
) -> Result<()> {
    let xml = to_xml(info, time_packaged)?;
    if let Some(parent) = path.parent() {
        runtime.create_dir_all(parent)?;
    }
    runtime
        .write(path, xml.as_bytes())
        .with_context(|| format!("Failed to write package definition {:?}", path))?;
    debug!("wrote package definition {:?}", path);
    Ok(())
}

/// Parse a definition file and re-root every `texmf/` file path onto `texmf_prefix`.
#[tracing::instrument(skip(runtime))]
pub fn read_package_definition_file<R: Runtime>(
    runtime: &R,
    path: &Path,
    texmf_prefix: &str,
) -> Result<PackageInfo> {
    let mut info = parse(runtime, path)?;
    for files in [
        &mut info.run_files,
        &mut info.doc_files,
        &mut info.source_files,
    ] {
        for file in files.iter_mut() {
            if let Some(rest) = strip_texmf_prefix(file) {
                *file = format!("{}{}", texmf_prefix, rest);
            }
        }
    }
    Ok(info)
}
