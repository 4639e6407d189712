mod client;

pub use client::{
    ApiErrorClass, BulkInitResponse, ConfirmUpload, DriveClient, DriveError, DriveItem,
    FileInitItem, FolderContents, ItemKind, TreeDelta, UploadTarget, UserInfo,
};
