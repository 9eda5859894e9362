use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::calendar::{
    FormatError, format_iso_date, iso_week_number, iso_week_year, parse_iso_date, quarter_of,
    start_of_iso_week, today_utc,
};
use crate::check::{check_state, has_errors};
use crate::cli::Invocation;
use crate::config::{Config, timeline_config_path};
use crate::datastore::StateStore;
use crate::layout::TimelineLayout;
use crate::model::{ActivityTransfer, FALLBACK_TASK_COLOR, TimelineState, Zoom};
use crate::render::Renderer;
use crate::scale::{apply_wheel, clamp_scale};
use crate::window::WindowPolicy;

const DEFAULT_VIEWPORT_WIDTH: usize = 120;
const DEFAULT_VIEWPORT_PIXELS: usize = 1200;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "chart", "rows", "ticks", "window", "week", "zoom", "scale", "filter", "type", "task",
        "activity", "check", "export", "import", "layout", "config", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &StateStore,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    dispatch_to(&mut out, store, cfg, renderer, &inv, Utc::now())
}

/// Runs one command against the store, writing its output to `out`.
#[instrument(skip(out, store, cfg, renderer, inv, now))]
pub fn dispatch_to<W: Write>(
    out: &mut W,
    store: &StateStore,
    cfg: &Config,
    renderer: &Renderer,
    inv: &Invocation,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, args = ?args, "dispatching command");

    match command {
        "chart" => cmd_chart(out, store, cfg, renderer, args, now),
        "rows" => renderer.write_rows(out, &build_layout(store, cfg, now)?),
        "ticks" => renderer.write_ticks(out, &build_layout(store, cfg, now)?),
        "window" => renderer.write_window(out, &build_layout(store, cfg, now)?),
        "layout" => {
            let layout = build_layout(store, cfg, now)?;
            serde_json::to_writer_pretty(&mut *out, &layout)?;
            writeln!(out)?;
            Ok(())
        }
        "week" => cmd_week(out, args, now),
        "zoom" => cmd_zoom(out, store, args),
        "scale" => cmd_scale(out, store, args),
        "filter" => cmd_filter(out, store, args),
        "type" => cmd_type(out, store, renderer, args),
        "task" => cmd_task(out, store, renderer, args),
        "activity" => cmd_activity(out, store, args, now),
        "check" => cmd_check(out, store, renderer),
        "export" => cmd_export(out, store, args),
        "import" => cmd_import(out, store, args),
        "config" => cmd_config(out, cfg),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Stored settings with this run's rc overrides on top.
fn build_layout(
    store: &StateStore,
    cfg: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<TimelineLayout> {
    let state = store.load()?;
    let mut settings = state.settings.clone();
    cfg.apply_settings_overrides(&mut settings)?;
    let policy = WindowPolicy::load(&timeline_config_path(&store.data_dir));
    Ok(TimelineLayout::build_with(&state, &settings, now, &policy))
}

/// Whole window by default; `chart today` crops to `viewport.pixels`
/// scrolled so today sits in the middle.
#[instrument(skip(out, store, cfg, renderer, args, now))]
fn cmd_chart<W: Write>(
    out: &mut W,
    store: &StateStore,
    cfg: &Config,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let layout = build_layout(store, cfg, now)?;
    let columns = cfg
        .get_usize("viewport.width")?
        .unwrap_or(DEFAULT_VIEWPORT_WIDTH);

    let visible = match args.first().map(String::as_str) {
        None | Some("all") => 0.0..layout.width,
        Some("today") => {
            let pixels = cfg
                .get_usize("viewport.pixels")?
                .unwrap_or(DEFAULT_VIEWPORT_PIXELS)
                .max(1) as f64;
            let start = layout.initial_scroll(pixels);
            debug!(start, pixels, "cropping chart around today");
            start..start + pixels
        }
        Some(other) => {
            return Err(anyhow!("unknown chart mode: {other} (expected all or today)"));
        }
    };

    renderer.write_chart(out, &layout, columns, visible)
}

#[instrument(skip(out, args, now))]
fn cmd_week<W: Write>(out: &mut W, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let date = match args.first() {
        Some(raw) => parse_iso_date(raw)?,
        None => today_utc(now),
    };
    writeln!(out, "date      {}", format_iso_date(date))?;
    writeln!(
        out,
        "week      W{} {}",
        iso_week_number(date),
        iso_week_year(date)
    )?;
    writeln!(out, "monday    {}", format_iso_date(start_of_iso_week(date)))?;
    writeln!(out, "quarter   Q{}", quarter_of(date))?;
    Ok(())
}

#[instrument(skip(out, store, args))]
fn cmd_zoom<W: Write>(out: &mut W, store: &StateStore, args: &[String]) -> anyhow::Result<()> {
    let mut state = store.load()?;
    let Some(raw) = args.first() else {
        writeln!(out, "{}", state.settings.zoom)?;
        return Ok(());
    };

    let zoom = Zoom::from_key(raw).ok_or_else(|| {
        anyhow!("invalid zoom level: {raw} (expected day, week, month or quarter)")
    })?;
    state.settings.zoom = zoom;
    state.settings.scale = 1.0;
    store.save(&state)?;

    info!(zoom = %zoom, "zoom updated");
    writeln!(out, "Zoom set to {zoom}.")?;
    Ok(())
}

#[instrument(skip(out, store, args))]
fn cmd_scale<W: Write>(out: &mut W, store: &StateStore, args: &[String]) -> anyhow::Result<()> {
    let mut state = store.load()?;
    let Some(raw) = args.first() else {
        writeln!(out, "{}", state.settings.scale)?;
        return Ok(());
    };

    let scale = if let Some(delta) = raw.strip_prefix("wheel:") {
        let delta: f64 = delta
            .trim()
            .parse()
            .with_context(|| format!("invalid wheel delta: {delta}"))?;
        apply_wheel(state.settings.scale, delta)
    } else {
        let factor: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid scale: {raw}"))?;
        clamp_scale(factor)
    };

    state.settings.scale = scale;
    store.save(&state)?;

    info!(scale, "scale updated");
    writeln!(out, "Scale set to {scale}.")?;
    Ok(())
}

#[instrument(skip(out, store, args))]
fn cmd_filter<W: Write>(out: &mut W, store: &StateStore, args: &[String]) -> anyhow::Result<()> {
    let mut state = store.load()?;
    let action = args.first().map(String::as_str);

    match action {
        None => {
            write_filter(out, &state)?;
            return Ok(());
        }
        Some("clear") => state.settings.filter_type_ids.clear(),
        Some("all") => {
            state.settings.filter_type_ids = state.types.iter().map(|t| t.id.clone()).collect();
        }
        Some("add") => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow!("filter add requires a type id"))?;
            if state.type_by_id(id).is_none() {
                return Err(anyhow!("unknown type id: {id}"));
            }
            if !state.settings.filter_type_ids.contains(id) {
                state.settings.filter_type_ids.push(id.clone());
            }
        }
        Some("remove") => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow!("filter remove requires a type id"))?;
            let before = state.settings.filter_type_ids.len();
            state.settings.filter_type_ids.retain(|existing| existing != id);
            if state.settings.filter_type_ids.len() == before {
                warn!(id = %id, "type id was not in the filter");
            }
        }
        Some(other) => {
            return Err(anyhow!(
                "unknown filter action: {other} (expected clear, all, add or remove)"
            ));
        }
    }

    store.save(&state)?;
    write_filter(out, &state)
}

fn write_filter<W: Write>(out: &mut W, state: &TimelineState) -> anyhow::Result<()> {
    if state.settings.filter_type_ids.is_empty() {
        writeln!(out, "Filter: none (all tasks visible)")?;
    } else {
        writeln!(out, "Filter: {}", state.settings.filter_type_ids.join(", "))?;
    }
    Ok(())
}

/// `key:value` arguments; a repeated key keeps the last value.
fn parse_modifiers<'a>(
    args: &'a [String],
    allowed: &[&str],
) -> anyhow::Result<BTreeMap<&'a str, &'a str>> {
    let mut mods = BTreeMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once(':')
            .ok_or_else(|| anyhow!("expected key:value, got {arg}"))?;
        if !allowed.contains(&key) {
            return Err(anyhow!(
                "unknown field: {key} (expected {})",
                allowed.join(", ")
            ));
        }
        mods.insert(key, value);
    }
    Ok(mods)
}

fn required<'a>(args: &'a [String], idx: usize, what: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing {what}"))
}

#[instrument(skip(out, store, renderer, args))]
fn cmd_type<W: Write>(
    out: &mut W,
    store: &StateStore,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let mut state = store.load()?;
    match args.first().map(String::as_str) {
        None | Some("list") => return renderer.write_types(out, &state.types),
        Some("add") => {
            let name = required(args, 1, "type name")?;
            let color = args.get(2).map(String::as_str).unwrap_or(FALLBACK_TASK_COLOR);
            let id = state.add_type(name, color)?;
            store.save(&state)?;
            info!(id = %id, "type added");
            writeln!(out, "Created type {id}.")?;
        }
        Some("edit") => {
            let id = required(args, 1, "type id")?;
            let mods = parse_modifiers(&args[2..], &["name", "color"])?;
            state.edit_type(id, mods.get("name").copied(), mods.get("color").copied())?;
            store.save(&state)?;
            info!(id = %id, "type updated");
            writeln!(out, "Updated type {id}.")?;
        }
        Some("delete") => {
            let id = required(args, 1, "type id")?;
            let removed = state.delete_type(id)?;
            store.save(&state)?;
            info!(id = %id, "type deleted");
            writeln!(out, "Deleted type {} ({}).", removed.id, removed.name)?;
        }
        Some(other) => {
            return Err(anyhow!(
                "unknown type action: {other} (expected list, add, edit or delete)"
            ));
        }
    }
    Ok(())
}

#[instrument(skip(out, store, renderer, args))]
fn cmd_task<W: Write>(
    out: &mut W,
    store: &StateStore,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let mut state = store.load()?;
    let action = args.first().map(String::as_str);

    if action == Some("show") {
        let id = required(args, 1, "task id")?;
        let (task, parent) = state
            .find_task(id)
            .ok_or_else(|| anyhow!("unknown task id: {id}"))?;
        return renderer.write_task(out, task, parent, &state.types);
    }

    let message = match action {
        Some("add") => {
            let id = state.add_task(&args[1..].join(" "));
            format!("Created task {id}.")
        }
        Some("sub") => {
            let parent = required(args, 1, "parent task id")?;
            let transfer = match args.get(2).map(String::as_str) {
                None | Some("move") => ActivityTransfer::Move,
                Some("clear") => ActivityTransfer::Clear,
                Some(other) => {
                    return Err(anyhow!(
                        "unknown activity transfer: {other} (expected move or clear)"
                    ));
                }
            };
            let id = state.add_subtask(parent, transfer)?;
            format!("Created sub-task {id} under {parent}.")
        }
        Some("edit") => {
            let id = required(args, 1, "task id")?;
            let mods = parse_modifiers(&args[2..], &["name", "desc"])?;
            state.update_task(id, mods.get("name").copied(), mods.get("desc").copied())?;
            format!("Updated task {id}.")
        }
        Some("delete") => {
            let id = required(args, 1, "task id")?;
            let removed = state.delete_task(id)?;
            format!("Deleted task {} ({}).", removed.id, removed.name)
        }
        Some(verb @ ("type-add" | "type-remove" | "type-up")) => {
            let id = required(args, 1, "task id")?;
            let type_id = required(args, 2, "type id")?;
            match verb {
                "type-add" => state.add_task_type(id, type_id)?,
                "type-remove" => state.remove_task_type(id, type_id)?,
                _ => state.raise_task_type(id, type_id)?,
            }
            format!("Updated types of task {id}.")
        }
        None => return Err(anyhow!("task requires an action")),
        Some(other) => {
            return Err(anyhow!(
                "unknown task action: {other} (expected show, add, sub, edit, delete, \
                 type-add, type-remove or type-up)"
            ));
        }
    };

    store.save(&state)?;
    info!(action = ?action, "task updated");
    writeln!(out, "{message}")?;
    Ok(())
}

#[instrument(skip(out, store, args, now))]
fn cmd_activity<W: Write>(
    out: &mut W,
    store: &StateStore,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut state = store.load()?;
    let action = args.first().map(String::as_str);
    let task_id = required(args, 1, "task id")?;

    let message = match action {
        Some("add") => {
            // An optional leading date; anything else starts the description.
            let (date, rest) = match args.get(2).map(|raw| parse_iso_date(raw)) {
                Some(Ok(date)) => (date, &args[3..]),
                Some(Err(err @ FormatError::OutOfRange { .. })) => return Err(err.into()),
                _ => (today_utc(now), &args[2..]),
            };
            let id = state.add_activity(task_id, date, &rest.join(" "))?;
            format!("Created activity {id} on {}.", format_iso_date(date))
        }
        Some("edit") => {
            let activity_id = required(args, 2, "activity id")?;
            let mods = parse_modifiers(&args[3..], &["date", "desc"])?;
            let date = mods.get("date").map(|raw| parse_iso_date(raw)).transpose()?;
            state.edit_activity(task_id, activity_id, date, mods.get("desc").copied())?;
            format!("Updated activity {activity_id}.")
        }
        Some("remove") => {
            let activity_id = required(args, 2, "activity id")?;
            let removed = state.remove_activity(task_id, activity_id)?;
            format!("Removed activity {} ({}).", removed.id, format_iso_date(removed.date))
        }
        _ => {
            return Err(anyhow!(
                "unknown activity action (expected add, edit or remove)"
            ));
        }
    };

    store.save(&state)?;
    info!(task = %task_id, "activities updated");
    writeln!(out, "{message}")?;
    Ok(())
}

#[instrument(skip(out, store, renderer))]
fn cmd_check<W: Write>(out: &mut W, store: &StateStore, renderer: &Renderer) -> anyhow::Result<()> {
    let state = store.load()?;
    let issues = check_state(&state);
    renderer.write_issues(&mut *out, &issues)?;

    if has_errors(&issues) {
        return Err(anyhow!(
            "{} issue(s) found in {}",
            issues.len(),
            store.state_path.display()
        ));
    }
    Ok(())
}

#[instrument(skip(out, store, args))]
fn cmd_export<W: Write>(out: &mut W, store: &StateStore, args: &[String]) -> anyhow::Result<()> {
    if let Some(path) = args.first() {
        store.export_file(Path::new(path))?;
        writeln!(out, "Exported to {path}.")?;
        return Ok(());
    }

    let state = store.load()?;
    serde_json::to_writer_pretty(&mut *out, &state)?;
    writeln!(out)?;
    Ok(())
}

#[instrument(skip(out, store, args))]
fn cmd_import<W: Write>(out: &mut W, store: &StateStore, args: &[String]) -> anyhow::Result<()> {
    let path = args
        .first()
        .ok_or_else(|| anyhow!("import requires a file path"))?;
    let state = store.import_file(Path::new(path))?;
    writeln!(
        out,
        "Imported {} task(s) and {} type(s).",
        state.tasks.len(),
        state.types.len()
    )?;
    Ok(())
}

fn cmd_config<W: Write>(out: &mut W, cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        writeln!(out, "{key} = {value}")?;
    }
    for file in &cfg.loaded_files {
        writeln!(out, "# loaded {}", file.display())?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "Commands: chart, rows, ticks, window, layout, week [DATE], zoom [LEVEL], \
         scale [FACTOR|wheel:DELTA], filter [clear|all|add ID|remove ID], \
         type [add NAME [COLOR]|edit ID name:X color:X|delete ID], \
         task [show ID|add NAME|sub ID [move|clear]|edit ID name:X desc:X|delete ID|\
         type-add ID TYPE|type-remove ID TYPE|type-up ID TYPE], \
         activity [add TASK [DATE] [TEXT]|edit TASK ID date:X desc:X|remove TASK ID], \
         check, export [PATH], import PATH, config, help, version"
    )?;
    Ok(())
}
