mod table_download;
