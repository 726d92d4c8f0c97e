/// Image reader: superblock, then both metadata regions, then the table
/// decoders
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::compression::CompressionRegistry;
use super::directory::{decode_directory_table, DirectoryEntry, DIR_SIZE_BIAS};
use super::id_table::IdTable;
use super::inode::{decode_inode_table, Inode, InodeKind};
use super::metadata::{read_metadata_region, resolve_span, BlockSpan, MetadataStream, ReaderConfig};
use super::superblock::Superblock;
use crate::error::Result;
use crate::fs::common::ByteSource;

pub struct SquashfsReader<S> {
    source: S,
    superblock: Superblock,
    registry: CompressionRegistry,
    config: ReaderConfig,
}

impl<S: ByteSource> SquashfsReader<S> {
    /// Read the superblock and prepare a reader with default settings
    pub fn new(source: S) -> Result<Self> {
        Self::with_config(source, ReaderConfig::default())
    }

    pub fn with_config(mut source: S, config: ReaderConfig) -> Result<Self> {
        let superblock = Superblock::read(&mut source)?;
        tracing::info!(
            "SquashFS {}.{} image ({}, {} compression, {} inodes)",
            superblock.version_major,
            superblock.version_minor,
            superblock.endianness,
            superblock.compression,
            superblock.inode_count
        );
        Ok(Self {
            source,
            superblock,
            registry: CompressionRegistry::default(),
            config,
        })
    }

    /// Replace the decompressors available to this reader
    pub fn with_registry(mut self, registry: CompressionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn read_region(&mut self, start: u64, end: u64) -> Result<MetadataStream> {
        let params = self.superblock.params();
        read_metadata_region(
            &mut self.source,
            start,
            end,
            &params,
            &self.registry,
            &self.config,
        )
    }

    /// Logical stream of the inode table
    pub fn read_inode_stream(&mut self) -> Result<MetadataStream> {
        let (start, end) = self.superblock.inode_table_range();
        self.read_region(start, end)
    }

    /// Logical stream of the directory table
    pub fn read_directory_stream(&mut self) -> Result<MetadataStream> {
        let (start, end) = self.superblock.directory_table_range(&mut self.source)?;
        self.read_region(start, end)
    }

    pub fn read_inodes(&mut self) -> Result<Vec<Inode>> {
        let stream = self.read_inode_stream()?;
        decode_inode_table(&stream.data, self.superblock.inode_count, &self.superblock.params())
    }

    pub fn read_directory_entries(&mut self) -> Result<Vec<DirectoryEntry>> {
        let stream = self.read_directory_stream()?;
        decode_directory_table(&stream.data, &self.superblock.params())
    }

    /// Read the uid/gid table. Not part of `read_all`.
    pub fn read_id_table(&mut self) -> Result<IdTable> {
        IdTable::read(&mut self.source, &self.superblock, &self.registry)
    }

    /// Decode the superblock, every inode and every directory entry
    pub fn read_all(mut self) -> Result<ImageContents> {
        let params = self.superblock.params();

        let inode_stream = self.read_inode_stream()?;
        let inodes = decode_inode_table(&inode_stream.data, self.superblock.inode_count, &params)?;

        let directory_stream = self.read_directory_stream()?;
        let entries = decode_directory_table(&directory_stream.data, &params)?;

        Ok(ImageContents::new(
            self.superblock,
            inodes,
            entries,
            inode_stream.blocks,
            directory_stream.blocks,
        ))
    }
}

/// Everything decoded from one image
#[derive(Debug, Clone, Serialize)]
pub struct ImageContents {
    pub superblock: Superblock,
    /// Inodes in decode order
    pub inodes: Vec<Inode>,
    /// Directory entries of all listings, in decode order
    pub entries: Vec<DirectoryEntry>,
    #[serde(skip)]
    inode_blocks: Vec<BlockSpan>,
    #[serde(skip)]
    directory_blocks: Vec<BlockSpan>,
    #[serde(skip)]
    by_number: HashMap<u32, usize>,
}

impl ImageContents {
    fn new(
        superblock: Superblock,
        inodes: Vec<Inode>,
        entries: Vec<DirectoryEntry>,
        inode_blocks: Vec<BlockSpan>,
        directory_blocks: Vec<BlockSpan>,
    ) -> Self {
        let mut by_number = HashMap::with_capacity(inodes.len());
        for (index, inode) in inodes.iter().enumerate() {
            if by_number.insert(inode.inode_number(), index).is_some() {
                tracing::warn!("Duplicate inode number {}", inode.inode_number());
            }
        }

        Self {
            superblock,
            inodes,
            entries,
            inode_blocks,
            directory_blocks,
            by_number,
        }
    }

    pub fn inode(&self, number: u32) -> Option<&Inode> {
        self.by_number.get(&number).map(|&index| &self.inodes[index])
    }

    /// The inode the superblock's root reference points at
    pub fn root_inode(&self) -> Option<&Inode> {
        let root = self.superblock.root_inode;
        let position = resolve_span(&self.inode_blocks, root.block, root.offset)?;
        self.inodes.iter().find(|inode| inode.position == position)
    }

    /// Entries listed under a directory inode. Empty for other inode kinds.
    pub fn list_directory(&self, inode: &Inode) -> Vec<&DirectoryEntry> {
        let InodeKind::Directory {
            start_block,
            file_size,
            offset,
            ..
        } = inode.kind
        else {
            return Vec::new();
        };

        let Some(start) = resolve_span(&self.directory_blocks, u64::from(start_block), offset)
        else {
            tracing::warn!(
                "Directory inode {} points at unknown block {}",
                inode.inode_number(),
                start_block
            );
            return Vec::new();
        };
        let end = start + usize::from(file_size).saturating_sub(DIR_SIZE_BIAS);

        self.entries
            .iter()
            .filter(|entry| entry.listing_offset >= start && entry.listing_offset < end)
            .collect()
    }

    /// Every path reachable from the root directory, depth first, with the
    /// inode it names. The root itself is "/".
    pub fn paths(&self) -> Vec<(String, &Inode)> {
        let mut out = Vec::new();
        let Some(root) = self.root_inode() else {
            return out;
        };

        let mut visited = HashSet::new();
        let mut stack = vec![(String::from("/"), root)];
        while let Some((path, inode)) = stack.pop() {
            if inode.is_directory() {
                // Guards against listings that loop back to an ancestor
                if !visited.insert(inode.inode_number()) {
                    continue;
                }
                // Reverse so the first entry is visited first
                for entry in self.list_directory(inode).into_iter().rev() {
                    match self.inode(entry.inode_number) {
                        Some(child) => {
                            let child_path = if path == "/" {
                                format!("/{}", entry.name)
                            } else {
                                format!("{}/{}", path, entry.name)
                            };
                            stack.push((child_path, child));
                        }
                        None => tracing::warn!(
                            "Entry {} points at missing inode {}",
                            entry.name,
                            entry.inode_number
                        ),
                    }
                }
            }
            out.push((path, inode));
        }
        out
    }
}
