mod collect;
mod config;
mod execute;
mod exif_reader;
mod exif_writer;
mod job;
mod metadata;
mod photo;
mod planner;
mod session;
mod template;

#[cfg(test)]
mod testing;

/// Template used until the user picks another one.
pub const DEFAULT_TEMPLATE: &str = "yyyy-MM-dd_";

pub use collect::{collect_photo_paths, is_photo, CollectStats, PHOTO_EXTENSIONS};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use execute::{
    execute_plan, CancelFlag, ExecuteError, ExecutionReport, MetadataFailure, Progress,
};
pub use exif_reader::{read_exif_capture_info, ExifMetadata};
pub use exif_writer::write_exif_capture_time;
pub use job::Executor;
pub use metadata::{CaptureInfo, MetadataError, MetadataReader, MetadataWriter};
pub use photo::{
    format_time_shift, parse_time_shift, GroupId, PhotoRecord, RecordId, SourceGroup,
    TimeShiftError, UNKNOWN_CAMERA,
};
pub use planner::{generate_plan, target_path, Conflict, PlanOptions, RenameEntry, RenamePlan};
pub use session::{Session, SessionError};
pub use template::{
    parse_template, render_name, render_preview_sample, validate_template, DateField,
    TemplateError, TemplatePart, NAME_EXTENSION,
};
